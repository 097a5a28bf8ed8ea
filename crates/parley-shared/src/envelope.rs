//! Reply envelope.
//!
//! Serializes as `{"result": ...}` or `{"error": "..."}`. Being an enum, a
//! reply can never carry both keys or neither.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Reply<T> {
    Result(T),
    Error(String),
}

impl<T> Reply<T> {
    pub fn success(result: T) -> Self {
        Reply::Result(result)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Reply::Result(value) => Ok(value),
            Reply::Error(message) => Err(message),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Reply<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Reply::Result(value),
            Err(e) => Reply::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_has_exactly_one_key() {
        let ok = serde_json::to_value(Reply::success(json!({"images": []}))).unwrap();
        assert_eq!(ok, json!({"result": {"images": []}}));

        let err = serde_json::to_value(Reply::<()>::error("boom")).unwrap();
        assert_eq!(err, json!({"error": "boom"}));
    }

    #[test]
    fn test_from_result() {
        let reply: Reply<u32> = Err::<u32, _>(std::io::Error::other("disk full")).into();
        assert!(reply.is_error());
        assert_eq!(reply.into_result(), Err("disk full".to_string()));
    }

    #[test]
    fn test_both_keys_rejected() {
        let parsed = serde_json::from_value::<Reply<u32>>(json!({"result": 1, "error": "x"}));
        assert!(parsed.is_err());
    }
}
