use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::models::{DeletionOutcome, RunState};
use crate::core::entry::{discover_nested_refs, EntryRef};
use crate::db::{DeleteOutcome, EntryStore};

pub const PROTECTED_ENTRY_REASON: &str = "Protected entry - requires manual deletion";


enum Frame {
    Enter(EntryRef),
    Exit(EntryRef),
}


/// Post-order deletion of an analyzed hierarchy: children before parents.
pub struct DeletionExecutor<'a> {
    store: &'a dyn EntryStore,
    dry_run: bool,
    delete_delay: Duration,
}

impl<'a> DeletionExecutor<'a> {
    pub fn new(store: &'a dyn EntryStore, dry_run: bool, delete_delay: Duration) -> Self {
        Self {
            store,
            dry_run,
            delete_delay,
        }
    }

    /// Deletes `root` and its nested entries, returning the outcome for `root`.
    ///
    /// Failures are recorded per entry in `state` and never stop siblings.
    pub async fn delete_recursively(&self, root: &EntryRef, state: &mut RunState) -> DeletionOutcome {
        let mut stack = vec![Frame::Enter(root.clone())];
        let mut root_outcome = None;

        while let Some(frame) = stack.pop() {
            let (entry, outcome) = match frame {
                Frame::Enter(entry) => match self.enter(&entry, state).await {
                    Ok(children) => {
                        stack.push(Frame::Exit(entry));
                        stack.extend(children.into_iter().rev().map(Frame::Enter));
                        continue;
                    }
                    Err(outcome) => (entry, outcome),
                },
                Frame::Exit(entry) => {
                    let outcome = self.exit(&entry, state).await;
                    (entry, outcome)
                }
            };

            if outcome == DeletionOutcome::SkippedDuplicateVisit {
                continue;
            }
            state.record_outcome(&entry, outcome.clone());
            if &entry == root {
                root_outcome = Some(outcome);
            }
        }

        root_outcome.unwrap_or(DeletionOutcome::SkippedDuplicateVisit)
    }

    /// Returns the children to descend into, or the final outcome when the
    /// entry stops here.
    async fn enter(&self, entry: &EntryRef, state: &mut RunState) -> Result<Vec<EntryRef>, DeletionOutcome> {
        if state.processed.contains(entry) {
            debug!("Skipping {} - already processed", entry);
            return Err(DeletionOutcome::SkippedDuplicateVisit);
        }
        state.processed.insert(entry.clone());

        if state.analysis_completed {
            match state.verdict(entry) {
                None => {
                    warn!("{} was not analyzed - skipping", entry);
                    return Err(DeletionOutcome::SkippedNotAnalyzed);
                }
                Some(verdict) if !verdict.to_be_deleted => {
                    info!("Skipping {} - PROTECTED ({})", entry, verdict.reason);
                    return Err(DeletionOutcome::ProtectedByAnalysis);
                }
                Some(_) => {}
            }
        }

        match self.store.fetch_entry(entry).await {
            Ok(Some(body)) => Ok(discover_nested_refs(&body)),
            Ok(None) => {
                info!("{} no longer exists - already deleted", entry);
                Err(DeletionOutcome::AlreadyDeleted)
            }
            Err(e) => {
                error!("Exception while fetching {}: {}", entry, e);
                let reason = e.to_string();
                state.record_failure(entry, reason.clone());
                Err(DeletionOutcome::Failed(reason))
            }
        }
    }

    async fn exit(&self, entry: &EntryRef, state: &mut RunState) -> DeletionOutcome {
        if self.dry_run {
            info!("[DRY RUN] Would delete: {}", entry);
            state.would_delete.push(entry.clone());
            return DeletionOutcome::WouldDelete;
        }

        info!("Deleting: {}", entry);
        let outcome = match self.store.delete_entry(entry).await {
            Ok(DeleteOutcome::Deleted) => {
                info!("Successfully deleted: {}", entry);
                state.deleted.push(entry.clone());
                DeletionOutcome::Deleted
            }
            Ok(DeleteOutcome::AlreadyDeleted) => {
                info!("Entry was already deleted: {}", entry);
                state.deleted.push(entry.clone());
                DeletionOutcome::AlreadyDeleted
            }
            Ok(DeleteOutcome::Protected) => {
                warn!("Entry is protected and cannot be auto-deleted: {}", entry);
                state.failed_deletions.insert(entry.clone(), PROTECTED_ENTRY_REASON.to_string());
                return DeletionOutcome::ProtectedManual;
            }
            Ok(DeleteOutcome::Failed(message)) => {
                error!("Failed to delete {}: {}", entry, message);
                state.record_failure(entry, message.clone());
                return DeletionOutcome::Failed(message);
            }
            Err(e) => {
                error!("Exception while deleting {}: {}", entry, e);
                let reason = e.to_string();
                state.record_failure(entry, reason.clone());
                return DeletionOutcome::Failed(reason);
            }
        };

        if !self.delete_delay.is_zero() {
            tokio::time::sleep(self.delete_delay).await;
        }
        outcome
    }
}
