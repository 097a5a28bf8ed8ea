//! v001 -- Initial schema creation.
//!
//! A single `documents` table holds every collection.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,                      -- the document's _id
    body       TEXT NOT NULL,                      -- JSON object, _id included
    created_at TEXT NOT NULL,                      -- RFC-3339

    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection
    ON documents (collection, seq);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
