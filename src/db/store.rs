use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::entry::{EntryRef, UID_FIELD};


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Retry exhausted after {0} attempts: {1}")]
    RetryExhausted(u32, String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}


/// Result of a single gateway delete, after any unpublish/workflow retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
    Protected,
    Failed(String),
}

impl DeleteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Deleted | Self::AlreadyDeleted)
    }
}


/// Opaque "some other entry points at this one" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Referrer(pub Value);

impl Referrer {
    /// Id of the referring entry: `entry_uid`, then `uid`, then `entry.uid`.
    pub fn referring_uid(&self) -> Option<&str> {
        self.0
            .get("entry_uid")
            .and_then(Value::as_str)
            .or_else(|| self.0.get(UID_FIELD).and_then(Value::as_str))
            .or_else(|| {
                self.0
                    .get("entry")
                    .and_then(|entry| entry.get(UID_FIELD))
                    .and_then(Value::as_str)
            })
    }
}


#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Returns `None` when the entry does not exist.
    async fn fetch_entry(&self, entry: &EntryRef) -> Result<Option<Value>, StoreError>;

    async fn delete_entry(&self, entry: &EntryRef) -> Result<DeleteOutcome, StoreError>;

    async fn list_referrers(&self, entry: &EntryRef) -> Result<Vec<Referrer>, StoreError>;

    async fn create_entry(&self, content_type_uid: &str, body: &Value) -> Result<EntryRef, StoreError>;

    async fn find_entry_by_title(
        &self,
        content_type_uid: &str,
        title: &str,
    ) -> Result<Option<EntryRef>, StoreError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_referring_uid_fallbacks() {
        assert_eq!(Referrer(json!({"entry_uid": "a", "uid": "b"})).referring_uid(), Some("a"));
        assert_eq!(Referrer(json!({"uid": "b"})).referring_uid(), Some("b"));
        assert_eq!(Referrer(json!({"entry": {"uid": "c"}})).referring_uid(), Some("c"));
        assert_eq!(Referrer(json!({"title": "x"})).referring_uid(), None);
    }

    #[test]
    fn test_delete_outcome_success() {
        assert!(DeleteOutcome::Deleted.is_success());
        assert!(DeleteOutcome::AlreadyDeleted.is_success());
        assert!(!DeleteOutcome::Protected.is_success());
        assert!(!DeleteOutcome::Failed("boom".into()).is_success());
    }
}
