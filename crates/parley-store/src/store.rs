//! The document store contract.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Field holding the identifier assigned on insert.
pub const ID_FIELD: &str = "_id";

/// A collection-oriented JSON document store.
///
/// Implementations are synchronous; [`crate::StoreGateway`] is what makes them
/// usable from async code.
pub trait DocumentStore: Send {
    /// Insert `record` into `collection`.
    ///
    /// The record must be a JSON object. If it has no string `_id`, one is
    /// assigned. Returns the record as stored, `_id` included.
    fn insert(&mut self, collection: &str, record: Value) -> Result<Value>;

    /// Return every document in `collection` matching `filter`, oldest first.
    ///
    /// `filter` is `null` or an object of top-level field equalities; an
    /// empty object matches everything.
    fn query(&self, collection: &str, filter: &Value) -> Result<Vec<Value>>;
}

/// Validate `record` and make sure it carries an `_id`.
pub(crate) fn prepare_document(record: Value) -> Result<(String, Map<String, Value>)> {
    let Value::Object(mut doc) = record else {
        return Err(StoreError::InvalidDocument(
            "record must be a JSON object".to_string(),
        ));
    };

    let id = match doc.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Null) | None => {
            let id = Uuid::new_v4().simple().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
        Some(other) => {
            return Err(StoreError::InvalidDocument(format!(
                "{ID_FIELD} must be a non-empty string, got {other}"
            )));
        }
    };

    Ok((id, doc))
}

/// Validate a filter, returning its conditions.
pub(crate) fn filter_conditions(filter: &Value) -> Result<Option<&Map<String, Value>>> {
    match filter {
        Value::Null => Ok(None),
        Value::Object(conditions) if conditions.is_empty() => Ok(None),
        Value::Object(conditions) => Ok(Some(conditions)),
        other => Err(StoreError::InvalidDocument(format!(
            "filter must be a JSON object, got {other}"
        ))),
    }
}

/// Whether `doc` satisfies every equality in `conditions`.
pub(crate) fn matches(doc: &Value, conditions: Option<&Map<String, Value>>) -> bool {
    let Some(conditions) = conditions else {
        return true;
    };
    conditions
        .iter()
        .all(|(field, expected)| doc.get(field) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_assigns_id() {
        let (id, doc) = prepare_document(json!({"text": "hi"})).unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(doc[ID_FIELD], Value::String(id));
    }

    #[test]
    fn test_prepare_keeps_existing_id() {
        let (id, _) = prepare_document(json!({"_id": "100500"})).unwrap();
        assert_eq!(id, "100500");
    }

    #[test]
    fn test_prepare_rejects_non_object() {
        assert!(prepare_document(json!("text")).is_err());
        assert!(prepare_document(json!({"_id": 7})).is_err());
    }

    #[test]
    fn test_matches() {
        let doc = json!({"_id": "1", "address": "alice"});
        assert!(matches(&doc, filter_conditions(&json!({})).unwrap()));
        assert!(matches(&doc, filter_conditions(&json!({"address": "alice"})).unwrap()));
        assert!(!matches(&doc, filter_conditions(&json!({"address": "bob"})).unwrap()));
        assert!(filter_conditions(&json!([1])).is_err());
    }
}
