//! Backup-format normalization of entry payloads.
//!
//! System metadata is stripped, stale internal asset links are dropped and
//! reference stubs are expanded inline so the result can be recreated later.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::entry::{EntryRef, CONTENT_TYPE_FIELD, INLINE_ENTRY_FIELD};
use crate::db::EntryStore;

const DEFAULT_CACHE_SIZE: usize = 256;

pub const KEYS_TO_REMOVE: &[&str] = &[
    "_version",
    "uid",
    "_in_progress",
    "_metadata",
    "ACL",
    "publish_details",
    "created_at",
    "createdAt",
    "updatedAt",
    "created_by",
    "updated_at",
    "updated_by",
    "supported",
    "mediaType",
    "apiDto",
    "isProcessing",
    "assetId",
    "sizeInBytes",
];

lazy_static! {
    static ref INTERNAL_URL_PATTERN: Regex = Regex::new(r"blt[0-9a-z]+").unwrap();
}


pub struct JsonCleanup {
    store: Option<Arc<dyn EntryStore>>,
    cache: LruCache<EntryRef, Option<Value>>,
    ancestors: HashSet<EntryRef>,
    fetches: usize,
}

impl JsonCleanup {
    /// Cleanup without reference expansion.
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_store(store: Arc<dyn EntryStore>) -> Self {
        Self::build(Some(store))
    }

    fn build(store: Option<Arc<dyn EntryStore>>) -> Self {
        Self {
            store,
            cache: LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            ancestors: HashSet::new(),
            fetches: 0,
        }
    }

    /// Number of store fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Cleans the body of `entry` itself. References back to `entry` stay stubs.
    pub async fn clean_entry(&mut self, entry: &EntryRef, body: &Value) -> Value {
        self.ancestors.insert(entry.clone());
        let cleaned = self.clean(body).await;
        self.ancestors.remove(entry);
        cleaned
    }

    pub fn clean<'a>(&'a mut self, value: &'a Value) -> BoxFuture<'a, Value> {
        async move {
            match value {
                Value::Array(items) => {
                    let mut cleaned = Vec::with_capacity(items.len());
                    for item in items {
                        cleaned.push(self.clean(item).await);
                    }
                    Value::Array(cleaned)
                }
                Value::Object(map) => self.clean_object(map).await,
                scalar => scalar.clone(),
            }
        }
        .boxed()
    }

    async fn clean_object(&mut self, map: &Map<String, Value>) -> Value {
        if let Some(reference) = EntryRef::decode_map(map) {
            if self.ancestors.contains(&reference) {
                debug!("Cyclic reference to {} kept as stub", reference);
                return Value::Object(map.clone());
            }
            if let Some(expanded) = self.expand(&reference).await {
                return expanded;
            }
        }

        let mut cleaned = Map::new();
        for (key, value) in map {
            if KEYS_TO_REMOVE.contains(&key.as_str()) {
                continue;
            }
            if key == "url" && value.as_str().is_some_and(|url| INTERNAL_URL_PATTERN.is_match(url)) {
                continue;
            }
            cleaned.insert(key.clone(), self.clean(value).await);
        }

        match map.get(CONTENT_TYPE_FIELD) {
            Some(content_type) if !cleaned.contains_key(INLINE_ENTRY_FIELD) => {
                let rest: Map<String, Value> = cleaned
                    .into_iter()
                    .filter(|(key, _)| key != CONTENT_TYPE_FIELD)
                    .collect();
                let mut restructured = Map::new();
                restructured.insert(CONTENT_TYPE_FIELD.to_string(), content_type.clone());
                restructured.insert(INLINE_ENTRY_FIELD.to_string(), Value::Object(rest));
                Value::Object(restructured)
            }
            _ => Value::Object(cleaned),
        }
    }

    /// Replaces a stub by its cleaned body. `None` falls back to plain cleaning.
    async fn expand(&mut self, reference: &EntryRef) -> Option<Value> {
        let body = self.fetch(reference).await?;

        self.ancestors.insert(reference.clone());
        let cleaned = self.clean(&body).await;
        self.ancestors.remove(reference);

        let mut expanded = Map::new();
        expanded.insert(
            CONTENT_TYPE_FIELD.to_string(),
            Value::String(reference.content_type_uid.clone()),
        );
        expanded.insert(INLINE_ENTRY_FIELD.to_string(), cleaned);
        Some(Value::Object(expanded))
    }

    async fn fetch(&mut self, reference: &EntryRef) -> Option<Value> {
        let store = self.store.clone()?;
        if let Some(cached) = self.cache.get(reference) {
            return cached.clone();
        }

        debug!("Fetching content for {}", reference);
        self.fetches += 1;
        match store.fetch_entry(reference).await {
            Ok(body) => {
                self.cache.put(reference.clone(), body.clone());
                body
            }
            Err(e) => {
                warn!("Failed to fetch content for {}: {}", reference, e);
                None
            }
        }
    }
}

impl Default for JsonCleanup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryEntryStore;
    use serde_json::json;
    use tokio_test::block_on;

    #[test]
    fn test_strips_metadata_and_internal_urls() {
        let input = json!({
            "title": "Hero",
            "uid": "blt1",
            "_version": 3,
            "ACL": {},
            "url": "/v3/assets/blt0a1b2c/file.png",
            "items": [{"url": "https://example.com/page", "created_by": "me"}]
        });

        let cleaned = block_on(JsonCleanup::new().clean(&input));

        assert_eq!(
            cleaned,
            json!({
                "title": "Hero",
                "items": [{"url": "https://example.com/page"}]
            })
        );
    }

    #[test]
    fn test_unexpanded_stub_is_restructured() {
        let input = json!({"card": {"_content_type_uid": "card", "uid": "c1", "title": "Card"}});
        let cleaned = block_on(JsonCleanup::new().clean(&input));
        assert_eq!(
            cleaned,
            json!({"card": {"_content_type_uid": "card", "entry": {"title": "Card"}}})
        );
    }

    #[test]
    fn test_expands_references_and_caches_diamonds() {
        let store = Arc::new(MemoryEntryStore::new());
        let shared = EntryRef::new("card", "c");
        store.insert(&shared, json!({"title": "Shared", "_version": 1}));

        let input = json!({"left": shared.stub(), "right": [shared.stub()]});
        let mut cleanup = JsonCleanup::with_store(store.clone());
        let cleaned = block_on(cleanup.clean(&input));

        let expanded = json!({"_content_type_uid": "card", "entry": {"title": "Shared"}});
        assert_eq!(cleaned, json!({"left": expanded.clone(), "right": [expanded]}));
        assert_eq!(cleanup.fetch_count(), 1);
    }

    #[test]
    fn test_cycle_keeps_stub() {
        let store = Arc::new(MemoryEntryStore::new());
        let a = EntryRef::new("hero", "a");
        let b = EntryRef::new("hero", "b");
        store.insert(&a, json!({"title": "A", "next": b.stub()}));
        store.insert(&b, json!({"title": "B", "next": a.stub()}));

        let mut cleanup = JsonCleanup::with_store(store);
        let cleaned = block_on(cleanup.clean(&a.stub()));

        assert_eq!(cleaned["entry"]["next"]["entry"]["title"], "B");
        assert_eq!(cleaned["entry"]["next"]["entry"]["next"], a.stub());
    }

    #[test]
    fn test_entry_body_cycle_is_not_refetched() {
        let store = Arc::new(MemoryEntryStore::new());
        let a = EntryRef::new("hero", "a");
        let b = EntryRef::new("hero", "b");
        store.insert(&a, json!({"title": "A", "next": b.stub()}));
        store.insert(&b, json!({"title": "B", "next": a.stub()}));
        let body = store.entry(&a).unwrap();

        let mut cleanup = JsonCleanup::with_store(store);
        let cleaned = block_on(cleanup.clean_entry(&a, &body));

        assert_eq!(cleaned["title"], "A");
        assert_eq!(cleaned["next"]["entry"]["next"], a.stub());
        assert_eq!(cleanup.fetch_count(), 1);
    }

    #[test]
    fn test_missing_reference_falls_back_to_plain_cleaning() {
        let store = Arc::new(MemoryEntryStore::new());
        let input = json!({"_content_type_uid": "card", "uid": "gone"});
        let cleaned = block_on(JsonCleanup::with_store(store).clean(&input));
        assert_eq!(cleaned, json!({"_content_type_uid": "card", "entry": {}}));
    }
}
