use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored body could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The record handed to `insert` is not usable as a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The gateway thread has stopped and can no longer serve requests.
    #[error("Store gateway is not running")]
    GatewayClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
