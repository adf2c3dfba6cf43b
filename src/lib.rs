pub mod core;
pub mod db;
pub mod toolkit;
pub mod utils;

pub use utils::{round_seconds, truncate_with_ellipsis};


pub use core::config::{Environment, StackConfig, SweepSettings};
pub use core::entry::EntryRef;
pub use core::error::{Result, SweepError};
pub use db::{ContentstackClient, EntryStore, MemoryEntryStore, StoreError};
pub use toolkit::{DeletionManager, DeletionOptions, DeletionSummary, EntryCreator, JsonCleanup};


pub const DEFAULT_BACKUP_DIR: &str = "temp";


pub const DEFAULT_CONTENT_TYPE: &str = "feature_page";


pub const DEFAULT_LOCALE: &str = "en-us";


pub const MIGRATION_TAG: &str = "migrated-from-cms";
