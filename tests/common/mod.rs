#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use entry_sweep::core::entry::EntryRef;
use entry_sweep::toolkit::deletion::{DeletionManager, DeletionOptions};
use entry_sweep::MemoryEntryStore;
use serde_json::{json, Value};

pub const TAG: &str = "migrated-from-cms";


pub fn entry(ct: &str, uid: &str) -> EntryRef {
    EntryRef::new(ct, uid)
}

/// Migrated entry body with the given fields merged in.
pub fn migrated(title: &str, fields: Value) -> Value {
    let mut body = json!({"title": title, "tags": [TAG]});
    if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), fields) {
        target.extend(extra);
    }
    body
}

pub fn options(backup_dir: &Path, dry_run: bool) -> DeletionOptions {
    DeletionOptions {
        dry_run,
        backup_dir: backup_dir.to_path_buf(),
        ..DeletionOptions::default()
    }
}

pub fn manager(store: &Arc<MemoryEntryStore>, backup_dir: &Path, dry_run: bool) -> DeletionManager {
    DeletionManager::new(store.clone(), options(backup_dir, dry_run))
}

/// page/a -> hero/b -> button/c, all migrated and referenced only by their parent.
pub fn chain(store: &MemoryEntryStore) -> (EntryRef, EntryRef, EntryRef) {
    let a = entry("page", "a");
    let b = entry("hero", "b");
    let c = entry("button", "c");
    store.insert(&a, migrated("A", json!({"hero": [b.stub()]})));
    store.insert(&b, migrated("B", json!({"cta": c.stub()})));
    store.insert(&c, migrated("C", json!({})));
    (a, b, c)
}
