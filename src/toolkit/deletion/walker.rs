use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::analyzer::ReferenceAnalyzer;
use super::models::{DeletionError, ReferenceVerdict, RunState};
use crate::core::entry::{discover_nested_refs, EntryRef};
use crate::db::EntryStore;


struct PendingChild {
    entry: EntryRef,
    parent: EntryRef,
}


/// Root-first analysis of an entry hierarchy.
pub struct HierarchyWalker<'a> {
    store: &'a dyn EntryStore,
    analyzer: ReferenceAnalyzer<'a>,
    child_delay: Duration,
}

impl<'a> HierarchyWalker<'a> {
    pub fn new(store: &'a dyn EntryStore, migration_tag: &'a str, child_delay: Duration) -> Self {
        Self {
            store,
            analyzer: ReferenceAnalyzer::new(store, migration_tag),
            child_delay,
        }
    }

    /// Walks `entry` and every entry reachable through deletable ancestors,
    /// recording a verdict for each.
    ///
    /// An error fetching a child payload aborts the walk; the caller must then
    /// treat the analysis as incomplete.
    pub async fn walk(
        &self,
        entry: &EntryRef,
        payload: &Value,
        root: &EntryRef,
        immediate_parent: Option<&EntryRef>,
        state: &mut RunState,
    ) -> Result<(), DeletionError> {
        let mut stack = self.visit(entry, payload, root, immediate_parent, state).await;

        while let Some(PendingChild { entry: child, parent }) = stack.pop() {
            if state.has_verdict(&child) {
                debug!("Skipping {} - already analyzed", child);
                continue;
            }

            if !self.child_delay.is_zero() {
                tokio::time::sleep(self.child_delay).await;
            }

            let child_payload = match self.store.fetch_entry(&child).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    warn!("Nested entry {} not found", child);
                    state.record_verdict(&child, ReferenceVerdict::protected("Entry not found", false));
                    state.referenced_entries.insert(child.clone());
                    continue;
                }
                Err(e) => {
                    return Err(DeletionError::AnalysisIncomplete(format!(
                        "could not fetch nested entry {}: {}",
                        child, e
                    )));
                }
            };

            let grandchildren = self.visit(&child, &child_payload, root, Some(&parent), state).await;
            stack.extend(grandchildren);
        }

        Ok(())
    }

    /// Analyzes one node and returns its children to visit, reversed for the stack.
    async fn visit(
        &self,
        entry: &EntryRef,
        payload: &Value,
        root: &EntryRef,
        immediate_parent: Option<&EntryRef>,
        state: &mut RunState,
    ) -> Vec<PendingChild> {
        if state.has_verdict(entry) {
            debug!("Skipping {} - already analyzed", entry);
            return Vec::new();
        }

        let parent_for_filtering = immediate_parent.unwrap_or(root);
        let verdict = self.analyzer.analyze(entry, parent_for_filtering, state).await;
        let nested = discover_nested_refs(payload);

        if !verdict.to_be_deleted {
            let mut inherited = 0;
            for child in &nested {
                if state.record_verdict(child, ReferenceVerdict::inherited(entry)) {
                    state.referenced_entries.insert(child.clone());
                    inherited += 1;
                }
            }
            if inherited > 0 {
                info!("{} nested entries of {} inherit its protection", inherited, entry);
            }
            return Vec::new();
        }

        debug!("{} has {} nested entries to analyze", entry, nested.len());
        nested
            .into_iter()
            .rev()
            .map(|child| PendingChild {
                entry: child,
                parent: entry.clone(),
            })
            .collect()
    }
}
