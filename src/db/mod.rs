pub mod client;
pub mod delete_flow;
pub mod memory;
pub mod store;


pub use client::ContentstackClient;
pub use delete_flow::{DeleteStage, StepResult};
pub use memory::{MemoryEntryStore, StoreCall};
pub use store::{DeleteOutcome, EntryStore, Referrer, StoreError};
