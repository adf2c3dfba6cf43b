//! In-process entry store for rehearsals and tests.
//!
//! Referrers are derived from the stored payloads, the same way the platform
//! answers its references endpoint. Failures can be injected per entry.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::store::{DeleteOutcome, EntryStore, Referrer, StoreError};
use crate::core::entry::{discover_nested_refs, entry_title, EntryRef, UID_FIELD};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Fetch(EntryRef),
    Delete(EntryRef),
    ListReferrers(EntryRef),
    Create(String),
    FindByTitle(String, String),
}


#[derive(Default)]
struct Inner {
    entries: BTreeMap<EntryRef, Value>,
    external_referrers: HashMap<EntryRef, Vec<Referrer>>,
    protected: HashSet<EntryRef>,
    fetch_failures: HashMap<EntryRef, usize>,
    fetch_counts: HashMap<EntryRef, usize>,
    failing_referrers: HashSet<EntryRef>,
    failing_deletes: HashSet<EntryRef>,
    failing_creates: HashSet<String>,
    rejected_creates: HashMap<String, String>,
    calls: Vec<StoreCall>,
    next_uid: u64,
}


#[derive(Default)]
pub struct MemoryEntryStore {
    inner: Mutex<Inner>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: &EntryRef, mut body: Value) {
        if let Some(map) = body.as_object_mut() {
            map.insert(UID_FIELD.to_string(), Value::String(entry.entry_uid.clone()));
        }
        self.inner.lock().entries.insert(entry.clone(), body);
    }

    /// Registers a referrer that lives outside the stored entries.
    pub fn add_external_referrer(&self, target: &EntryRef, referrer: &EntryRef) {
        self.inner
            .lock()
            .external_referrers
            .entry(target.clone())
            .or_default()
            .push(Referrer(json!({
                "entry_uid": referrer.entry_uid,
                "content_type_uid": referrer.content_type_uid,
            })));
    }

    /// Registers a raw referrer record, which may lack any entry id.
    pub fn add_referrer_record(&self, target: &EntryRef, referrer: Referrer) {
        self.inner
            .lock()
            .external_referrers
            .entry(target.clone())
            .or_default()
            .push(referrer);
    }

    /// Deletes of `entry` will report `Protected`.
    pub fn protect(&self, entry: &EntryRef) {
        self.inner.lock().protected.insert(entry.clone());
    }

    /// The `nth` fetch (1-based) of `entry` fails with a transport error.
    pub fn fail_fetch_on(&self, entry: &EntryRef, nth: usize) {
        self.inner.lock().fetch_failures.insert(entry.clone(), nth);
    }

    pub fn fail_referrers(&self, entry: &EntryRef) {
        self.inner.lock().failing_referrers.insert(entry.clone());
    }

    pub fn fail_delete(&self, entry: &EntryRef) {
        self.inner.lock().failing_deletes.insert(entry.clone());
    }

    pub fn fail_create(&self, content_type_uid: &str) {
        self.inner.lock().failing_creates.insert(content_type_uid.to_string());
    }

    /// The next create for `content_type_uid` is rejected with `message`.
    pub fn reject_create_once(&self, content_type_uid: &str, message: &str) {
        self.inner
            .lock()
            .rejected_creates
            .insert(content_type_uid.to_string(), message.to_string());
    }

    pub fn contains(&self, entry: &EntryRef) -> bool {
        self.inner.lock().entries.contains_key(entry)
    }

    pub fn entry(&self, entry: &EntryRef) -> Option<Value> {
        self.inner.lock().entries.get(entry).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<EntryRef> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn referrer_calls(&self) -> Vec<EntryRef> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::ListReferrers(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn fetch_entry(&self, entry: &EntryRef) -> Result<Option<Value>, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Fetch(entry.clone()));

        let count = inner.fetch_counts.entry(entry.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        if inner.fetch_failures.get(entry) == Some(&count) {
            return Err(StoreError::RetryExhausted(
                3,
                format!("simulated network failure fetching {}", entry),
            ));
        }

        Ok(inner.entries.get(entry).cloned())
    }

    async fn delete_entry(&self, entry: &EntryRef) -> Result<DeleteOutcome, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Delete(entry.clone()));

        if inner.failing_deletes.contains(entry) {
            return Err(StoreError::Backend(format!("simulated delete failure for {}", entry)));
        }
        if inner.protected.contains(entry) {
            return Ok(DeleteOutcome::Protected);
        }
        match inner.entries.remove(entry) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyDeleted),
        }
    }

    async fn list_referrers(&self, entry: &EntryRef) -> Result<Vec<Referrer>, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::ListReferrers(entry.clone()));

        if inner.failing_referrers.contains(entry) {
            return Err(StoreError::Backend(format!("simulated reference query failure for {}", entry)));
        }

        let mut referrers: Vec<Referrer> = inner
            .entries
            .iter()
            .filter(|(owner, body)| *owner != entry && discover_nested_refs(body).contains(entry))
            .map(|(owner, body)| {
                Referrer(json!({
                    "entry_uid": owner.entry_uid,
                    "content_type_uid": owner.content_type_uid,
                    "title": entry_title(body),
                }))
            })
            .collect();

        if let Some(external) = inner.external_referrers.get(entry) {
            referrers.extend(external.iter().cloned());
        }

        Ok(referrers)
    }

    async fn create_entry(&self, content_type_uid: &str, body: &Value) -> Result<EntryRef, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Create(content_type_uid.to_string()));

        if inner.failing_creates.contains(content_type_uid) {
            return Err(StoreError::Status {
                status: 422,
                message: format!("simulated create failure for {}", content_type_uid),
            });
        }
        if let Some(message) = inner.rejected_creates.remove(content_type_uid) {
            return Err(StoreError::Status { status: 422, message });
        }

        inner.next_uid += 1;
        let entry = EntryRef::new(content_type_uid, format!("mem{:08}", inner.next_uid));
        let mut stored = body.clone();
        if let Some(map) = stored.as_object_mut() {
            map.insert(UID_FIELD.to_string(), Value::String(entry.entry_uid.clone()));
        }
        inner.entries.insert(entry.clone(), stored);

        Ok(entry)
    }

    async fn find_entry_by_title(
        &self,
        content_type_uid: &str,
        title: &str,
    ) -> Result<Option<EntryRef>, StoreError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(StoreCall::FindByTitle(content_type_uid.to_string(), title.to_string()));

        Ok(inner
            .entries
            .iter()
            .find(|(entry, body)| entry.content_type_uid == content_type_uid && entry_title(body) == Some(title))
            .map(|(entry, _)| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_referrers_derived_from_payloads() {
        let store = MemoryEntryStore::new();
        let page = EntryRef::new("page", "p1");
        let hero = EntryRef::new("hero", "h1");
        store.insert(&page, json!({"title": "Page", "hero": hero.stub()}));
        store.insert(&hero, json!({"title": "Hero"}));

        let referrers = store.list_referrers(&hero).await.unwrap();
        assert_eq!(referrers.len(), 1);
        assert_eq!(referrers[0].referring_uid(), Some("p1"));
        assert!(store.list_referrers(&page).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_outcomes() {
        let store = MemoryEntryStore::new();
        let a = EntryRef::new("hero", "a");
        let b = EntryRef::new("hero", "b");
        store.insert(&a, json!({}));
        store.insert(&b, json!({}));
        store.protect(&b);

        assert_eq!(store.delete_entry(&a).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete_entry(&a).await.unwrap(), DeleteOutcome::AlreadyDeleted);
        assert_eq!(store.delete_entry(&b).await.unwrap(), DeleteOutcome::Protected);
        assert_eq!(store.delete_calls(), vec![a.clone(), a, b]);
    }

    #[tokio::test]
    async fn test_nth_fetch_failure() {
        let store = MemoryEntryStore::new();
        let a = EntryRef::new("hero", "a");
        store.insert(&a, json!({"title": "A"}));
        store.fail_fetch_on(&a, 2);

        assert!(store.fetch_entry(&a).await.unwrap().is_some());
        assert!(store.fetch_entry(&a).await.is_err());
        assert!(store.fetch_entry(&a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_and_find_by_title() {
        let store = MemoryEntryStore::new();
        let created = store.create_entry("card", &json!({"title": "Promo"})).await.unwrap();
        assert_eq!(store.find_entry_by_title("card", "Promo").await.unwrap(), Some(created));
        assert_eq!(store.find_entry_by_title("hero", "Promo").await.unwrap(), None);
    }
}
