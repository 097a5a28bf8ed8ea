use chrono::Utc;
use rusqlite::params;
use serde_json::Value;

use crate::database::Database;
use crate::error::Result;
use crate::store::{filter_conditions, matches, prepare_document, DocumentStore, ID_FIELD};

impl DocumentStore for Database {
    fn insert(&mut self, collection: &str, record: Value) -> Result<Value> {
        let (id, doc) = prepare_document(record)?;
        let doc = Value::Object(doc);

        self.conn().execute(
            "INSERT INTO documents (collection, id, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                collection,
                id,
                serde_json::to_string(&doc)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::debug!(collection, id = %id, "inserted document");
        Ok(doc)
    }

    fn query(&self, collection: &str, filter: &Value) -> Result<Vec<Value>> {
        let conditions = filter_conditions(filter)?;

        // `_id` lookups go through the unique index.
        let by_id = conditions
            .and_then(|c| c.get(ID_FIELD))
            .and_then(Value::as_str);

        let bodies: Vec<String> = match by_id {
            Some(id) => {
                let mut stmt = self.conn().prepare(
                    "SELECT body FROM documents
                     WHERE collection = ?1 AND id = ?2
                     ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![collection, id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = self.conn().prepare(
                    "SELECT body FROM documents
                     WHERE collection = ?1
                     ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![collection], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            }
        };

        let mut documents = Vec::with_capacity(bodies.len());
        for body in bodies {
            let doc: Value = serde_json::from_str(&body)?;
            if matches(&doc, conditions) {
                documents.push(doc);
            }
        }
        Ok(documents)
    }
}
