//! In-memory document store.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::store::{filter_conditions, matches, prepare_document, DocumentStore, ID_FIELD};

/// Keeps every collection in a `Vec`, in insertion order. Nothing survives a
/// restart; useful for tests and throwaway instances.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&mut self, collection: &str, record: Value) -> Result<Value> {
        let (id, doc) = prepare_document(record)?;
        let docs = self.collections.entry(collection.to_string()).or_default();

        if docs.iter().any(|d| d[ID_FIELD].as_str() == Some(id.as_str())) {
            return Err(StoreError::InvalidDocument(format!(
                "duplicate {ID_FIELD} {id} in {collection}"
            )));
        }

        let doc = Value::Object(doc);
        docs.push(doc.clone());
        Ok(doc)
    }

    fn query(&self, collection: &str, filter: &Value) -> Result<Vec<Value>> {
        let conditions = filter_conditions(filter)?;
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches(doc, conditions))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
