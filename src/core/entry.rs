use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};


pub const CONTENT_TYPE_FIELD: &str = "_content_type_uid";

pub const UID_FIELD: &str = "uid";

pub const INLINE_ENTRY_FIELD: &str = "entry";

pub const TAGS_FIELD: &str = "tags";

pub const TITLE_FIELD: &str = "title";


/// Identity of an entry. A uid is only unique within its content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryRef {
    pub content_type_uid: String,
    pub entry_uid: String,
}

impl EntryRef {
    pub fn new(content_type_uid: impl Into<String>, entry_uid: impl Into<String>) -> Self {
        Self {
            content_type_uid: content_type_uid.into(),
            entry_uid: entry_uid.into(),
        }
    }

    /// Decodes a reference stub: an object carrying both marker fields as strings.
    pub fn decode(value: &Value) -> Option<Self> {
        Self::decode_map(value.as_object()?)
    }

    pub fn decode_map(map: &Map<String, Value>) -> Option<Self> {
        let content_type = map.get(CONTENT_TYPE_FIELD)?.as_str()?;
        let uid = map.get(UID_FIELD)?.as_str()?;
        Some(Self::new(content_type, uid))
    }

    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn stub(&self) -> Value {
        serde_json::json!({
            UID_FIELD: self.entry_uid,
            CONTENT_TYPE_FIELD: self.content_type_uid,
        })
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content_type_uid, self.entry_uid)
    }
}


/// A JSON value classified at the ingestion boundary.
pub enum EntryNode<'a> {
    Reference {
        entry: EntryRef,
        fields: &'a Map<String, Value>,
    },
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Scalar,
}

impl<'a> EntryNode<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => match EntryRef::decode_map(map) {
                Some(entry) => EntryNode::Reference { entry, fields: map },
                None => EntryNode::Object(map),
            },
            Value::Array(items) => EntryNode::Array(items),
            _ => EntryNode::Scalar,
        }
    }
}


/// Collects nested entry references in first-discovery order, without duplicates.
///
/// Every field of a reference stub is scanned too, apart from the two marker
/// fields, so inline `entry` bodies and sibling stubs are both found.
pub fn discover_nested_refs(payload: &Value) -> Vec<EntryRef> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![payload];

    while let Some(value) = stack.pop() {
        match EntryNode::classify(value) {
            EntryNode::Reference { entry, fields } => {
                if seen.insert(entry.clone()) {
                    found.push(entry);
                }
                let children: Vec<&Value> = fields
                    .iter()
                    .filter(|(key, _)| *key != CONTENT_TYPE_FIELD && *key != UID_FIELD)
                    .map(|(_, value)| value)
                    .collect();
                stack.extend(children.into_iter().rev());
            }
            EntryNode::Object(map) => {
                let children: Vec<&Value> = map.values().collect();
                stack.extend(children.into_iter().rev());
            }
            EntryNode::Array(items) => {
                stack.extend(items.iter().rev());
            }
            EntryNode::Scalar => {}
        }
    }

    found
}


pub fn has_migration_marker(entry: &Value, marker: &str) -> bool {
    entry
        .get(TAGS_FIELD)
        .and_then(Value::as_array)
        .map(|tags| tags.iter().any(|tag| tag.as_str() == Some(marker)))
        .unwrap_or(false)
}


pub fn entry_title(entry: &Value) -> Option<&str> {
    entry.get(TITLE_FIELD).and_then(Value::as_str)
}
