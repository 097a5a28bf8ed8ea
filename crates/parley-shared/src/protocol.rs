use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// A chat message as sent by clients.
///
/// Only `address` is interpreted by the relay. Every other field is carried
/// through untouched so the stored document matches what the client sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Destination address, without the connection prefix.
    pub address: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ChatMessage {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }
        let message: ChatMessage = serde_json::from_str(raw)?;
        if message.address.trim().is_empty() {
            return Err(ProtocolError::MissingAddress);
        }
        Ok(message)
    }

    /// Full address of the connection this message is meant for.
    pub fn target(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.address)
    }

    /// The message as a JSON document for storage.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert("address".to_string(), Value::String(self.address.clone()));
        Value::Object(doc)
    }
}
