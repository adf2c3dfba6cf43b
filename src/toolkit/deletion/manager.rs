use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::backup::BackupRecorder;
use super::executor::DeletionExecutor;
use super::models::{BackupSummary, DeletionError, DeletionOptions, DeletionSummary, RunState};
use super::walker::HierarchyWalker;
use crate::core::entry::EntryRef;
use crate::db::EntryStore;
use crate::utils::round_seconds;


pub struct DeletionManager {
    store: Arc<dyn EntryStore>,
    options: DeletionOptions,
}

impl DeletionManager {
    pub fn new(store: Arc<dyn EntryStore>, options: DeletionOptions) -> Self {
        info!(
            "Initializing DeletionManager (environment: {}, dry run: {})",
            options.environment, options.dry_run
        );
        Self { store, options }
    }

    /// Backs up, analyzes and then deletes `entry_uid` with everything nested
    /// under it that is not referenced from elsewhere.
    ///
    /// Nothing is deleted unless the analysis phase completed.
    pub async fn delete_entry_recursively(&self, entry_uid: &str, content_type_uid: Option<&str>) -> DeletionSummary {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let content_type_uid = match content_type_uid {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => {
                info!("No content type provided, defaulting to: {}", self.options.default_content_type);
                self.options.default_content_type.clone()
            }
        };
        let root = EntryRef::new(content_type_uid, entry_uid);

        info!("Starting recursive deletion of {} (run {})", root, run_id);

        let backup = self.backup(&root).await;
        let mut state = RunState::new();

        if let Err(e) = self.analyze(&root, &mut state).await {
            error!("Deletion aborted for {}: {}", root, e);
            return self.summarize(&root, run_id, started, &state, backup, Some(e.to_string()));
        }
        state.analysis_completed = true;

        let executor = DeletionExecutor::new(self.store.as_ref(), self.options.dry_run, self.options.delete_delay);
        let outcome = executor.delete_recursively(&root, &mut state).await;
        info!("Root {} finished as {}", root, outcome);

        self.summarize(&root, run_id, started, &state, backup, None)
    }

    async fn backup(&self, root: &EntryRef) -> BackupSummary {
        let mut recorder = BackupRecorder::new(self.store.clone(), self.options.backup_dir.clone());

        if !recorder.backup(root).await {
            warn!("Backup failed, but continuing with deletion process");
            return BackupSummary {
                total_backed_up: recorder.total_backed_up(),
                backup_file_path: None,
                backup_success: false,
            };
        }

        let backup_file_path = match recorder.save_to_file(root) {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                warn!("Could not write backup file for {}: {}", root, e);
                None
            }
        };

        BackupSummary {
            total_backed_up: recorder.total_backed_up(),
            backup_file_path,
            backup_success: true,
        }
    }

    async fn analyze(&self, root: &EntryRef, state: &mut RunState) -> Result<(), DeletionError> {
        let payload = self
            .store
            .fetch_entry(root)
            .await
            .map_err(|e| DeletionError::AnalysisIncomplete(format!("could not fetch {}: {}", root, e)))?
            .unwrap_or(Value::Null);

        let walker = HierarchyWalker::new(
            self.store.as_ref(),
            &self.options.migration_tag,
            self.options.child_delay,
        );
        walker.walk(root, &payload, root, None, state).await?;

        if let Some(reason) = state.verdict(root).and_then(|v| v.analysis_error.clone()) {
            return Err(DeletionError::AnalysisIncomplete(reason));
        }

        info!(
            "Reference analysis completed: {} safe to delete, {} protected",
            state.orphaned_entries.len(),
            state.referenced_entries.len()
        );
        Ok(())
    }

    fn summarize(
        &self,
        root: &EntryRef,
        run_id: String,
        started: Instant,
        state: &RunState,
        backup: BackupSummary,
        error: Option<String>,
    ) -> DeletionSummary {
        let duration = round_seconds(started.elapsed());
        let keys = |entries: &[EntryRef]| entries.iter().map(EntryRef::key).collect::<Vec<_>>();

        let deleted_entries = keys(&state.deleted);
        let would_delete_entries = keys(&state.would_delete);
        let protected_entries: Vec<String> = state.protected_entries().into_iter().map(EntryRef::key).collect();
        let failed_deletions = state
            .failed_deletions
            .iter()
            .map(|(entry, reason)| (entry.key(), reason.clone()))
            .collect::<std::collections::BTreeMap<_, _>>();

        let mode = if self.options.dry_run { "DRY RUN" } else { "RECURSIVE DELETION" };
        match &error {
            None => info!("{} COMPLETED in {} seconds", mode, duration),
            Some(e) => error!("{} FAILED after {} seconds: {}", mode, duration, e),
        }

        DeletionSummary {
            success: error.is_none(),
            error,
            run_id,
            entry_uid: root.entry_uid.clone(),
            content_type_uid: root.content_type_uid.clone(),
            environment: self.options.environment.clone(),
            duration,
            dry_run: self.options.dry_run,
            total_deleted: deleted_entries.len(),
            total_would_delete: would_delete_entries.len(),
            total_failed: failed_deletions.len(),
            total_protected: protected_entries.len(),
            deleted_entries,
            would_delete_entries,
            failed_deletions,
            protected_entries,
            backup,
            timestamp: Local::now().to_rfc3339(),
        }
    }
}
