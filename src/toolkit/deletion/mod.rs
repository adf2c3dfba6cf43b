pub mod analyzer;
pub mod backup;
pub mod executor;
pub mod manager;
pub mod models;
pub mod rollback;
pub mod walker;

pub use analyzer::{external_referrers, ReferenceAnalyzer};
pub use backup::{BackupRecord, BackupRecorder};
pub use executor::{DeletionExecutor, PROTECTED_ENTRY_REASON};
pub use manager::DeletionManager;
pub use models::{
    BackupSummary, CreatedEntry, DeletionError, DeletionOptions, DeletionOutcome, DeletionSummary,
    ReferenceVerdict, RollbackItem, RollbackReport, RunState, VerdictSource,
};
pub use rollback::RollbackCoordinator;
pub use walker::HierarchyWalker;
