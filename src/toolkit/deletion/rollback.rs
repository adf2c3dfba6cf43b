use std::collections::HashSet;

use tracing::{error, info, warn};

use super::analyzer::external_referrers;
use super::executor::PROTECTED_ENTRY_REASON;
use super::models::{CreatedEntry, RollbackItem, RollbackReport};
use crate::db::{DeleteOutcome, EntryStore};


enum RollbackVerdict {
    Safe,
    Protected(String),
}


/// Removes the entries a failed creation run left behind.
///
/// References between entries of the same batch do not block deletion;
/// anything referenced from outside the batch is kept.
pub struct RollbackCoordinator<'a> {
    store: &'a dyn EntryStore,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(store: &'a dyn EntryStore) -> Self {
        Self { store }
    }

    pub async fn rollback(&self, created: &mut Vec<CreatedEntry>) -> RollbackReport {
        let mut report = RollbackReport::default();

        if created.is_empty() {
            info!("No entries to roll back - no new entries were created");
            return report;
        }

        info!("Rolling back {} created entries", created.len());
        let verdicts = self.analyze(created).await;

        let mut safe = Vec::new();
        for (item, verdict) in created.iter().zip(verdicts) {
            match verdict {
                RollbackVerdict::Safe => safe.push(item),
                RollbackVerdict::Protected(reason) => {
                    warn!("{} ({}) is PROTECTED and needs manual cleanup: {}", item.entry, item.title, reason);
                    report.protected.push(RollbackItem {
                        entry: item.entry.clone(),
                        title: item.title.clone(),
                        reason,
                    });
                }
            }
        }

        let total = safe.len();
        for (position, item) in safe.into_iter().rev().enumerate() {
            info!("Deleting entry {}/{}: {} ({})", position + 1, total, item.title, item.entry);

            let failure = match self.store.delete_entry(&item.entry).await {
                Ok(DeleteOutcome::Deleted) | Ok(DeleteOutcome::AlreadyDeleted) => {
                    report.deleted.push(item.entry.clone());
                    continue;
                }
                Ok(DeleteOutcome::Protected) => PROTECTED_ENTRY_REASON.to_string(),
                Ok(DeleteOutcome::Failed(message)) => message,
                Err(e) => e.to_string(),
            };

            error!("Failed to delete {} during rollback: {}", item.entry, failure);
            report.failed.push(RollbackItem {
                entry: item.entry.clone(),
                title: item.title.clone(),
                reason: failure,
            });
        }

        info!(
            "Rollback completed: {} deleted, {} failed, {} protected",
            report.deleted.len(),
            report.failed.len(),
            report.protected.len()
        );

        created.clear();
        report
    }

    async fn analyze(&self, created: &[CreatedEntry]) -> Vec<RollbackVerdict> {
        let batch: HashSet<&str> = created.iter().map(|item| item.entry.entry_uid.as_str()).collect();
        let mut verdicts = Vec::with_capacity(created.len());

        for item in created {
            let verdict = match self.store.list_referrers(&item.entry).await {
                Ok(referrers) => {
                    let external = external_referrers(referrers, &batch);
                    if external.is_empty() {
                        info!("{} - SAFE TO DELETE", item.entry);
                        RollbackVerdict::Safe
                    } else {
                        RollbackVerdict::Protected(format!(
                            "Referenced in {} external entries (not created in this batch)",
                            external.len()
                        ))
                    }
                }
                Err(e) => {
                    warn!("Error checking references for {}: {}", item.entry, e);
                    RollbackVerdict::Protected(format!(
                        "Reference check failed: {} - assuming protected for safety",
                        e
                    ))
                }
            };
            verdicts.push(verdict);
        }

        verdicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::EntryRef;
    use crate::db::MemoryEntryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let store = MemoryEntryStore::new();
        let mut created = Vec::new();
        let report = RollbackCoordinator::new(&store).rollback(&mut created).await;
        assert!(report.is_clean());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reference_check_failure_protects() {
        let store = MemoryEntryStore::new();
        let a = EntryRef::new("card", "a");
        store.insert(&a, json!({"title": "A"}));
        store.fail_referrers(&a);

        let mut created = vec![CreatedEntry::new(a.clone(), "A")];
        let report = RollbackCoordinator::new(&store).rollback(&mut created).await;

        assert!(created.is_empty());
        assert!(store.delete_calls().is_empty());
        assert!(report.protected[0].reason.starts_with("Reference check failed:"));
    }

    #[tokio::test]
    async fn test_delete_failure_reported_and_list_cleared() {
        let store = MemoryEntryStore::new();
        let a = EntryRef::new("card", "a");
        let b = EntryRef::new("card", "b");
        store.insert(&a, json!({"title": "A"}));
        store.insert(&b, json!({"title": "B"}));
        store.fail_delete(&b);

        let mut created = vec![CreatedEntry::new(a.clone(), "A"), CreatedEntry::new(b.clone(), "B")];
        let report = RollbackCoordinator::new(&store).rollback(&mut created).await;

        assert_eq!(store.delete_calls(), vec![b.clone(), a.clone()]);
        assert_eq!(report.deleted, vec![a]);
        assert_eq!(report.failed[0].entry, b);
        assert!(created.is_empty());
    }
}
