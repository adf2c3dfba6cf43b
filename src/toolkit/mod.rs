pub mod cleanup;
pub mod creation;
pub mod deletion;


pub use cleanup::JsonCleanup;
pub use creation::{CreationError, CreationResult, EntryCreator};
pub use deletion::{DeletionManager, DeletionOptions, DeletionSummary};
