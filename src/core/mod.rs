pub mod config;
pub mod entry;
pub mod error;

pub use config::{Environment, StackConfig, SweepSettings};
pub use entry::{discover_nested_refs, has_migration_marker, EntryNode, EntryRef};
pub use error::{Result, SweepError};
