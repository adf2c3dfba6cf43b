mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{chain, entry, manager, migrated, TAG};
use entry_sweep::toolkit::deletion::{
    DeletionExecutor, DeletionOutcome, HierarchyWalker, ReferenceAnalyzer, RunState,
};
use entry_sweep::MemoryEntryStore;
use serde_json::json;

#[tokio::test]
async fn test_revisit_is_skipped_without_calls() {
    let store = MemoryEntryStore::new();
    let (a, _, _) = chain(&store);
    let mut state = RunState::new();
    state.processed.insert(a.clone());

    let executor = DeletionExecutor::new(&store, false, Duration::ZERO);
    let outcome = executor.delete_recursively(&a, &mut state).await;

    assert_eq!(outcome, DeletionOutcome::SkippedDuplicateVisit);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_reference_query_failure_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let (a, _, _) = chain(&store);
    store.fail_referrers(&a);

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await;

    assert!(!summary.success);
    assert!(summary.error.unwrap().starts_with("Reference analysis failed"));
    assert!(store.delete_calls().is_empty());
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_nested_fetch_failure_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let (_, _, c) = chain(&store);
    // first fetch of c belongs to the backup, second to the walker
    store.fail_fetch_on(&c, 2);

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await;

    assert!(!summary.success);
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn test_unmarked_entry_is_always_protected() {
    let store = MemoryEntryStore::new();
    let legacy = entry("hero", "legacy");
    store.insert(&legacy, json!({"title": "Hand made"}));

    let analyzer = ReferenceAnalyzer::new(&store, TAG);
    let mut state = RunState::new();
    let verdict = analyzer.analyze(&legacy, &legacy, &mut state).await;

    assert!(!verdict.to_be_deleted);
    assert_eq!(verdict.reason, "Missing migration marker");
    assert!(store.referrer_calls().is_empty());
}

#[tokio::test]
async fn test_traversal_parent_is_not_external() {
    let store = MemoryEntryStore::new();
    let (a, b, _) = chain(&store);

    let analyzer = ReferenceAnalyzer::new(&store, TAG);
    let mut state = RunState::new();
    let verdict = analyzer.analyze(&b, &a, &mut state).await;

    assert!(verdict.to_be_deleted);
    assert!(verdict.references.is_empty());
}

#[tokio::test]
async fn test_protected_root_passes_protection_to_children() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let root = entry("page", "r");
    let left = entry("hero", "l");
    let right = entry("card", "x");
    store.insert(&root, migrated("Root", json!({"hero": left.stub(), "cards": [right.stub()]})));
    store.insert(&left, migrated("Left", json!({})));
    store.insert(&right, migrated("Right", json!({})));
    store.add_external_referrer(&root, &entry("landing", "elsewhere"));

    let walker = HierarchyWalker::new(store.as_ref(), TAG, Duration::ZERO);
    let mut state = RunState::new();
    let payload = store.entry(&root).unwrap();
    walker.walk(&root, &payload, &root, None, &mut state).await.unwrap();

    for child in [&left, &right] {
        let verdict = state.verdict(child).unwrap();
        assert!(!verdict.to_be_deleted);
        assert_eq!(verdict.reason, "Inherited protection from parent page/r");
    }
    assert_eq!(store.referrer_calls(), vec![root.clone()]);

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("r", Some("page")).await;
    assert!(summary.success);
    assert_eq!(summary.total_deleted, 0);
    assert_eq!(summary.protected_entries, vec!["page/r".to_string()]);
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn test_chain_deleted_leaf_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let (a, b, c) = chain(&store);

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await;

    assert!(summary.success);
    assert_eq!(store.delete_calls(), vec![c, b, a]);
    assert_eq!(summary.deleted_entries, vec!["button/c", "hero/b", "page/a"]);
    assert_eq!(summary.total_deleted, 3);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_shared_child_survives() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let root = entry("page", "r");
    let shared = entry("card", "shared");
    let other = entry("page", "other");
    store.insert(&root, migrated("Root", json!({"card": shared.stub()})));
    store.insert(&shared, migrated("Shared", json!({})));
    store.insert(&other, json!({"title": "Other", "card": shared.stub()}));

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("r", Some("page")).await;

    assert!(summary.success);
    assert_eq!(store.delete_calls(), vec![root]);
    assert!(store.contains(&shared));
    assert_eq!(summary.protected_entries, vec!["card/shared".to_string()]);
}

#[tokio::test]
async fn test_backup_failure_does_not_change_outcomes() {
    let with_backup = {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryEntryStore::new());
        chain(&store);
        manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await
    };

    let without_backup = {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryEntryStore::new());
        let (a, _, _) = chain(&store);
        store.fail_fetch_on(&a, 1);
        manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await
    };

    assert!(with_backup.backup.backup_success);
    assert!(!without_backup.backup.backup_success);
    assert!(without_backup.backup.backup_file_path.is_none());

    let set = |entries: &[String]| entries.iter().cloned().collect::<BTreeSet<_>>();
    assert_eq!(set(&with_backup.deleted_entries), set(&without_backup.deleted_entries));
    assert_eq!(set(&with_backup.would_delete_entries), set(&without_backup.would_delete_entries));
    assert_eq!(with_backup.failed_deletions, without_backup.failed_deletions);
}

#[tokio::test]
async fn test_dry_run_reports_without_deleting() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let root = entry("page", "r");
    let child = entry("hero", "c");
    store.insert(&root, migrated("Root", json!({"hero": child.stub()})));
    store.insert(&child, migrated("Child", json!({})));

    let summary = manager(&store, dir.path(), true).delete_entry_recursively("r", Some("page")).await;

    assert!(summary.success);
    assert!(summary.dry_run);
    assert_eq!(summary.total_would_delete, 2);
    assert_eq!(summary.total_deleted, 0);
    assert_eq!(summary.would_delete_entries, vec!["hero/c", "page/r"]);
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn test_root_fetch_failure_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let root = entry("page", "r");
    store.insert(&root, migrated("Root", json!({})));
    store.fail_fetch_on(&root, 3);

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("r", Some("page")).await;

    assert!(!summary.success);
    assert!(summary.error.unwrap().contains("Reference analysis failed"));
    assert!(store.delete_calls().is_empty());
    assert!(store.contains(&root));
}

#[tokio::test]
async fn test_summary_serializes_for_cli() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    chain(&store);

    let summary = manager(&store, dir.path(), true).delete_entry_recursively("a", Some("page")).await;
    let value = serde_json::to_value(&summary).unwrap();

    assert_eq!(value["success"], true);
    assert_eq!(value["total_would_delete"], 3);
    assert!(value.get("error").is_none());
    assert!(value["backup"]["backup_file_path"].as_str().unwrap().contains("backup_page_a_"));
}

#[tokio::test]
async fn test_stub_sibling_field_is_walked_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntryStore::new());
    let a = entry("page", "a");
    let b = entry("hero", "b");
    let x = entry("card", "x");
    let mut stub = b.stub();
    stub["meta"] = x.stub();
    store.insert(&a, migrated("A", json!({"hero": [stub]})));
    store.insert(&b, migrated("B", json!({})));
    store.insert(&x, migrated("X", json!({})));

    let summary = manager(&store, dir.path(), false).delete_entry_recursively("a", Some("page")).await;

    assert!(summary.success);
    assert_eq!(store.delete_calls(), vec![b, x, a]);
    assert!(store.is_empty());
}
