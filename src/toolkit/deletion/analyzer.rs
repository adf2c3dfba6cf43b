use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::models::{ReferenceVerdict, RunState};
use crate::core::entry::{has_migration_marker, EntryRef};
use crate::db::{EntryStore, Referrer, StoreError};


/// Referrers that do not come from an excluded entry id.
///
/// A referrer whose referring id cannot be determined counts as external, so
/// it protects the entry. Older rollback tooling skipped such referrers; here
/// an unidentifiable referrer is never assumed to be part of the batch.
pub fn external_referrers(referrers: Vec<Referrer>, excluded_uids: &HashSet<&str>) -> Vec<Referrer> {
    referrers
        .into_iter()
        .filter(|referrer| match referrer.referring_uid() {
            Some(uid) => !excluded_uids.contains(uid),
            None => true,
        })
        .collect()
}


pub struct ReferenceAnalyzer<'a> {
    store: &'a dyn EntryStore,
    migration_tag: &'a str,
}

impl<'a> ReferenceAnalyzer<'a> {
    pub fn new(store: &'a dyn EntryStore, migration_tag: &'a str) -> Self {
        Self { store, migration_tag }
    }

    /// Decides whether `entry` may be deleted, ignoring references coming
    /// from `parent_for_filtering` (the link being traversed).
    ///
    /// Verdicts are memoized per entry only: a later call through a different
    /// parent gets the first verdict back unchanged.
    pub async fn analyze(
        &self,
        entry: &EntryRef,
        parent_for_filtering: &EntryRef,
        state: &mut RunState,
    ) -> ReferenceVerdict {
        if let Some(cached) = state.verdict(entry) {
            debug!("Using cached verdict for {}", entry);
            return cached.clone();
        }

        let verdict = match self.compute(entry, parent_for_filtering).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Error analyzing references for {}: {} - assuming protected", entry, e);
                ReferenceVerdict::errored(e)
            }
        };

        if verdict.to_be_deleted {
            info!("{} - SAFE TO DELETE ({})", entry, verdict.reason);
            state.orphaned_entries.insert(entry.clone());
        } else {
            info!("{} - PROTECTED ({})", entry, verdict.reason);
            state.referenced_entries.insert(entry.clone());
        }

        state.record_verdict(entry, verdict.clone());
        verdict
    }

    async fn compute(
        &self,
        entry: &EntryRef,
        parent_for_filtering: &EntryRef,
    ) -> Result<ReferenceVerdict, StoreError> {
        let Some(body) = self.store.fetch_entry(entry).await? else {
            return Ok(ReferenceVerdict::protected("Entry not found", false));
        };

        if !has_migration_marker(&body, self.migration_tag) {
            return Ok(ReferenceVerdict::protected("Missing migration marker", false));
        }

        let referrers = self.store.list_referrers(entry).await?;
        let total = referrers.len();
        let excluded = HashSet::from([parent_for_filtering.entry_uid.as_str()]);
        let external = external_referrers(referrers, &excluded);
        debug!("{} has {} referrers, {} external", entry, total, external.len());

        if external.is_empty() {
            Ok(ReferenceVerdict::deletable())
        } else {
            Ok(ReferenceVerdict::referenced(external))
        }
    }
}
