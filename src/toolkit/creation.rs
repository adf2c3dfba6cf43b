//! Recreates content from a backup-format document.
//!
//! Nested inline entries are created leaf-first and replaced by reference
//! stubs. Every new entry is tracked so a failed run can be rolled back.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::entry::{EntryRef, CONTENT_TYPE_FIELD, INLINE_ENTRY_FIELD, TAGS_FIELD, TITLE_FIELD};
use crate::db::{EntryStore, StoreError};
use crate::toolkit::deletion::{CreatedEntry, RollbackCoordinator, RollbackReport};

const PAGE_ID_FIELD: &str = "page_id";


#[derive(Debug, Error)]
pub enum CreationError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("{source} (rolled back: {} deleted, {} failed, {} protected)", .report.deleted.len(), .report.failed.len(), .report.protected.len())]
    RolledBack {
        source: Box<CreationError>,
        report: RollbackReport,
    },
}


#[derive(Debug, Clone, Serialize)]
pub struct CreationResult {
    pub root: EntryRef,
    pub created: Vec<CreatedEntry>,
    pub reused: Vec<EntryRef>,
}


pub struct EntryCreator {
    store: Arc<dyn EntryStore>,
    migration_tag: String,
    entry_reuse_enabled: bool,
    retry_duplicate_page_id: bool,
    created: Vec<CreatedEntry>,
    reused: Vec<EntryRef>,
}

impl EntryCreator {
    pub fn new(store: Arc<dyn EntryStore>, migration_tag: impl Into<String>, entry_reuse_enabled: bool) -> Self {
        info!("Entry reuse: {}", if entry_reuse_enabled { "ENABLED" } else { "DISABLED" });
        Self {
            store,
            migration_tag: migration_tag.into(),
            entry_reuse_enabled,
            retry_duplicate_page_id: false,
            created: Vec::new(),
            reused: Vec::new(),
        }
    }

    /// Retry a create rejected for a duplicate `page_id` once, with a unique id.
    pub fn with_duplicate_page_id_retry(mut self, enabled: bool) -> Self {
        self.retry_duplicate_page_id = enabled;
        self
    }

    /// Entries created so far in this run, in creation order.
    pub fn created(&self) -> &[CreatedEntry] {
        &self.created
    }

    /// Creates the root entry of `document` (`{"entry": {...}}`) and everything
    /// nested in it. On failure all entries created by this call are rolled back.
    pub async fn create_document(
        &mut self,
        document: &Value,
        content_type_uid: &str,
    ) -> Result<CreationResult, CreationError> {
        let body = document
            .get(INLINE_ENTRY_FIELD)
            .filter(|body| body.is_object())
            .cloned()
            .ok_or_else(|| CreationError::InvalidDocument("expected an object under \"entry\"".to_string()))?;

        self.created.clear();
        self.reused.clear();

        match self.process_entry(body, content_type_uid.to_string()).await {
            Ok(root) => {
                info!(
                    "Root entry created: {} ({} new, {} reused)",
                    root,
                    self.created.len(),
                    self.reused.len()
                );
                Ok(CreationResult {
                    root,
                    created: self.created.clone(),
                    reused: self.reused.clone(),
                })
            }
            Err(e) => {
                error!("Content creation failed: {}", e);
                let report = RollbackCoordinator::new(self.store.as_ref())
                    .rollback(&mut self.created)
                    .await;
                Err(CreationError::RolledBack {
                    source: Box::new(e),
                    report,
                })
            }
        }
    }

    fn process_entry(&mut self, body: Value, content_type_uid: String) -> BoxFuture<'_, Result<EntryRef, CreationError>> {
        async move {
            let Value::Object(fields) = body else {
                return Err(CreationError::InvalidDocument(format!(
                    "entry for {} is not an object",
                    content_type_uid
                )));
            };

            let mut resolved = Map::new();
            for (key, value) in fields {
                if key == "url" {
                    continue;
                }
                resolved.insert(key, self.resolve_nested(value).await?);
            }
            let mut body = Value::Object(resolved);

            let title = body.get(TITLE_FIELD).and_then(Value::as_str).map(str::to_string);

            if self.entry_reuse_enabled {
                if let Some(title) = &title {
                    if let Some(existing) = self.store.find_entry_by_title(&content_type_uid, title).await? {
                        info!("Using existing entry {} for \"{}\"", existing, title);
                        self.reused.push(existing.clone());
                        return Ok(existing);
                    }
                }
            }

            self.add_migration_tag(&mut body);
            let entry = match self.store.create_entry(&content_type_uid, &body).await {
                Ok(entry) => entry,
                Err(e) if self.retry_duplicate_page_id && is_duplicate_page_id_error(&e) => {
                    warn!("Duplicate page_id for {}, retrying with timestamp suffix: {}", content_type_uid, e);
                    make_page_id_unique(&mut body);
                    self.store.create_entry(&content_type_uid, &body).await?
                }
                Err(e) => return Err(e.into()),
            };
            self.created.push(CreatedEntry::new(
                entry.clone(),
                title.unwrap_or_else(|| "No title".to_string()),
            ));
            info!("Added {} to rollback tracking ({} total)", entry, self.created.len());

            Ok(entry)
        }
        .boxed()
    }

    /// Creates inline entries found in `value` and swaps them for stubs.
    fn resolve_nested(&mut self, value: Value) -> BoxFuture<'_, Result<Value, CreationError>> {
        async move {
            match value {
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_nested(item).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Object(mut map) => {
                    let inline = map.get(CONTENT_TYPE_FIELD).and_then(Value::as_str).map(str::to_string);
                    if let Some(content_type_uid) = inline {
                        if map.get(INLINE_ENTRY_FIELD).is_some_and(Value::is_object) {
                            let nested = map.remove(INLINE_ENTRY_FIELD).unwrap_or(Value::Null);
                            let entry = self.process_entry(nested, content_type_uid).await?;
                            return Ok(entry.stub());
                        }
                    }

                    let mut resolved = Map::new();
                    for (key, value) in map {
                        resolved.insert(key, self.resolve_nested(value).await?);
                    }
                    Ok(Value::Object(resolved))
                }
                scalar => Ok(scalar),
            }
        }
        .boxed()
    }

    fn add_migration_tag(&self, body: &mut Value) {
        let Some(map) = body.as_object_mut() else { return };
        let tags = map
            .entry(TAGS_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !tags.is_array() {
            *tags = Value::Array(Vec::new());
        }
        if let Value::Array(tags) = tags {
            if !tags.iter().any(|tag| tag.as_str() == Some(self.migration_tag.as_str())) {
                tags.push(Value::String(self.migration_tag.clone()));
            }
        }
    }
}


fn is_duplicate_page_id_error(error: &StoreError) -> bool {
    let message = error.to_string().to_lowercase();
    ["is not unique", PAGE_ID_FIELD, "duplicate"]
        .iter()
        .any(|pattern| message.contains(*pattern))
}

fn make_page_id_unique(body: &mut Value) {
    let Some(map) = body.as_object_mut() else { return };
    let millis = Utc::now().timestamp_millis();
    let page_id = match map.get(PAGE_ID_FIELD).and_then(Value::as_str) {
        Some(current) => format!("{}-{}", current, millis),
        None => format!("entry-{}", millis),
    };
    info!("Using page_id \"{}\"", page_id);
    map.insert(PAGE_ID_FIELD.to_string(), Value::String(page_id));
}
