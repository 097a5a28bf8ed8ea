use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty payload")]
    Empty,

    #[error("Malformed chat message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Chat message has an empty destination address")]
    MissingAddress,
}
