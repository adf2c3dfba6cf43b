use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::models::DeletionError;
use crate::core::entry::EntryRef;
use crate::db::EntryStore;
use crate::toolkit::cleanup::JsonCleanup;


#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub entry: EntryRef,
    pub cleaned_data: Value,
    pub timestamp: DateTime<Local>,
}


/// Captures cleaned copies of entries before they are deleted.
pub struct BackupRecorder {
    store: Arc<dyn EntryStore>,
    backup_dir: PathBuf,
    records: HashMap<EntryRef, BackupRecord>,
}

impl BackupRecorder {
    pub fn new(store: Arc<dyn EntryStore>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
            records: HashMap::new(),
        }
    }

    /// Fetches and cleans `entry`. Returns false on any failure; never panics
    /// the caller's run.
    pub async fn backup(&mut self, entry: &EntryRef) -> bool {
        match self.capture(entry).await {
            Ok(record) => {
                info!("Backed up: {}", entry);
                self.records.insert(entry.clone(), record);
                true
            }
            Err(e) => {
                error!("Failed to backup {}: {}", entry, e);
                false
            }
        }
    }

    async fn capture(&self, entry: &EntryRef) -> Result<BackupRecord, DeletionError> {
        let body = self
            .store
            .fetch_entry(entry)
            .await?
            .ok_or_else(|| DeletionError::Backup(format!("entry {} not found", entry)))?;

        let mut cleanup = JsonCleanup::with_store(self.store.clone());
        let cleaned_data = cleanup.clean_entry(entry, &body).await;

        Ok(BackupRecord {
            entry: entry.clone(),
            cleaned_data,
            timestamp: Local::now(),
        })
    }

    pub fn total_backed_up(&self) -> usize {
        self.records.len()
    }

    /// Writes `{"entry": <cleaned body>}` for `root` and returns the file path.
    pub fn save_to_file(&self, root: &EntryRef) -> Result<PathBuf, DeletionError> {
        let record = self
            .records
            .get(root)
            .ok_or_else(|| DeletionError::Backup(format!("no backup captured for {}", root)))?;

        std::fs::create_dir_all(&self.backup_dir)?;

        let timestamp = Local::now().format("%Y%m%d-%H%M%S");
        let filename = format!("backup_{}_{}_{}.json", root.content_type_uid, root.entry_uid, timestamp);
        let path = self.backup_dir.join(filename);

        let document = json!({ "entry": record.cleaned_data });
        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;

        info!("Backup saved to: {}", path.display());
        Ok(path)
    }
}
