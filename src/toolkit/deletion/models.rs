use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::core::config::SweepSettings;
use crate::core::entry::EntryRef;
use crate::db::{Referrer, StoreError};
use crate::{DEFAULT_BACKUP_DIR, DEFAULT_CONTENT_TYPE, MIGRATION_TAG};


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictSource {
    Direct,
    Inherited { parent: EntryRef },
}


/// Safety decision for one entry. Written once per run, never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVerdict {
    pub to_be_deleted: bool,
    pub references: Vec<Referrer>,
    pub reason: String,
    pub has_migration_marker: bool,
    pub source: VerdictSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl ReferenceVerdict {
    pub fn deletable() -> Self {
        Self {
            to_be_deleted: true,
            references: Vec::new(),
            reason: "No external references found".to_string(),
            has_migration_marker: true,
            source: VerdictSource::Direct,
            analysis_error: None,
        }
    }

    pub fn protected(reason: impl Into<String>, has_migration_marker: bool) -> Self {
        Self {
            to_be_deleted: false,
            references: Vec::new(),
            reason: reason.into(),
            has_migration_marker,
            source: VerdictSource::Direct,
            analysis_error: None,
        }
    }

    pub fn referenced(references: Vec<Referrer>) -> Self {
        Self {
            reason: format!("Referenced in {} external entries", references.len()),
            references,
            ..Self::protected("", true)
        }
    }

    pub fn inherited(parent: &EntryRef) -> Self {
        Self {
            reason: format!("Inherited protection from parent {}", parent),
            source: VerdictSource::Inherited { parent: parent.clone() },
            ..Self::protected("", false)
        }
    }

    pub fn errored(error: impl std::fmt::Display) -> Self {
        let message = error.to_string();
        Self {
            reason: format!("Error analyzing references: {}", message),
            analysis_error: Some(message),
            ..Self::protected("", false)
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self.source, VerdictSource::Inherited { .. })
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    AlreadyDeleted,
    WouldDelete,
    ProtectedManual,
    ProtectedByAnalysis,
    Failed(String),
    SkippedNotAnalyzed,
    SkippedDuplicateVisit,
}


/// Everything one invocation learns. Created fresh per run, never shared.
#[derive(Debug, Default)]
pub struct RunState {
    pub processed: HashSet<EntryRef>,
    pub deleted: Vec<EntryRef>,
    pub would_delete: Vec<EntryRef>,
    pub failed_deletions: BTreeMap<EntryRef, String>,
    pub reference_analysis: HashMap<EntryRef, ReferenceVerdict>,
    pub referenced_entries: HashSet<EntryRef>,
    pub orphaned_entries: HashSet<EntryRef>,
    pub outcomes: BTreeMap<EntryRef, DeletionOutcome>,
    pub analysis_completed: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdict(&self, entry: &EntryRef) -> Option<&ReferenceVerdict> {
        self.reference_analysis.get(entry)
    }

    pub fn has_verdict(&self, entry: &EntryRef) -> bool {
        self.reference_analysis.contains_key(entry)
    }

    /// First writer wins. Returns false when a verdict already existed.
    pub fn record_verdict(&mut self, entry: &EntryRef, verdict: ReferenceVerdict) -> bool {
        if self.reference_analysis.contains_key(entry) {
            return false;
        }
        self.reference_analysis.insert(entry.clone(), verdict);
        true
    }

    pub fn record_outcome(&mut self, entry: &EntryRef, outcome: DeletionOutcome) {
        self.outcomes.entry(entry.clone()).or_insert(outcome);
    }

    pub fn record_failure(&mut self, entry: &EntryRef, reason: impl Into<String>) {
        let reason = reason.into();
        self.failed_deletions.insert(entry.clone(), reason.clone());
        self.record_outcome(entry, DeletionOutcome::Failed(reason));
    }

    pub fn protected_entries(&self) -> Vec<&EntryRef> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == DeletionOutcome::ProtectedByAnalysis)
            .map(|(entry, _)| entry)
            .collect()
    }
}


#[derive(Debug, Clone)]
pub struct DeletionOptions {
    pub dry_run: bool,
    pub environment: String,
    pub default_content_type: String,
    pub migration_tag: String,
    pub backup_dir: PathBuf,
    pub child_delay: Duration,
    pub delete_delay: Duration,
}

impl Default for DeletionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            environment: "dev".to_string(),
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            migration_tag: MIGRATION_TAG.to_string(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            child_delay: Duration::ZERO,
            delete_delay: Duration::ZERO,
        }
    }
}

impl DeletionOptions {
    pub fn from_settings(settings: &SweepSettings, environment: &str, dry_run: bool) -> Self {
        Self {
            dry_run,
            environment: environment.to_string(),
            default_content_type: settings.default_content_type.clone(),
            migration_tag: settings.migration_tag.clone(),
            backup_dir: settings.backup_dir.clone(),
            child_delay: settings.child_delay(),
            delete_delay: settings.delete_delay(),
        }
    }
}


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSummary {
    pub total_backed_up: usize,
    pub backup_file_path: Option<String>,
    pub backup_success: bool,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: String,
    pub entry_uid: String,
    pub content_type_uid: String,
    pub environment: String,
    pub duration: f64,
    pub dry_run: bool,
    pub deleted_entries: Vec<String>,
    pub would_delete_entries: Vec<String>,
    pub failed_deletions: BTreeMap<String, String>,
    pub protected_entries: Vec<String>,
    pub total_deleted: usize,
    pub total_would_delete: usize,
    pub total_failed: usize,
    pub total_protected: usize,
    pub backup: BackupSummary,
    pub timestamp: String,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEntry {
    pub entry: EntryRef,
    pub title: String,
}

impl CreatedEntry {
    pub fn new(entry: EntryRef, title: impl Into<String>) -> Self {
        Self {
            entry,
            title: title.into(),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackItem {
    pub entry: EntryRef,
    pub title: String,
    pub reason: String,
}


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub deleted: Vec<EntryRef>,
    pub failed: Vec<RollbackItem>,
    pub protected: Vec<RollbackItem>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.protected.is_empty()
    }
}


#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("Reference analysis failed: {0}")]
    AnalysisIncomplete(String),
    #[error("Backup failed: {0}")]
    Backup(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_verdict_wins() {
        let mut state = RunState::new();
        let entry = EntryRef::new("hero", "a");
        assert!(state.record_verdict(&entry, ReferenceVerdict::deletable()));
        assert!(!state.record_verdict(&entry, ReferenceVerdict::inherited(&EntryRef::new("page", "p"))));
        assert!(state.verdict(&entry).unwrap().to_be_deleted);
    }

    #[test]
    fn test_inherited_reason_names_parent() {
        let verdict = ReferenceVerdict::inherited(&EntryRef::new("page", "p"));
        assert!(!verdict.to_be_deleted);
        assert!(verdict.is_inherited());
        assert_eq!(verdict.reason, "Inherited protection from parent page/p");
    }

    #[test]
    fn test_failure_recorded_once_as_outcome() {
        let mut state = RunState::new();
        let entry = EntryRef::new("hero", "a");
        state.record_failure(&entry, "boom");
        assert_eq!(state.failed_deletions.get(&entry).map(String::as_str), Some("boom"));
        assert_eq!(state.outcomes.get(&entry), Some(&DeletionOutcome::Failed("boom".into())));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DeletionOutcome::ProtectedByAnalysis.to_string(), "protected_by_analysis");
        assert_eq!(DeletionOutcome::Failed("x".into()).to_string(), "failed");
    }
}
