//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use parley_shared::constants::{
    CHANNEL_CAPACITY, DEFAULT_CONNECTION_PREFIX, DEFAULT_HTTP_PORT, DEFAULT_WS_PORT,
    IMAGE_COLLECTION, MAX_UPLOAD_SIZE, MESSAGE_COLLECTION, STREAM_CHUNK_SIZE,
};

/// Names of the logical destinations the components talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Prefix prepended to a chat message's `address` to find the
    /// connection it is meant for.
    pub connection_prefix: String,
    /// Collection chat messages are stored in.
    pub messages: String,
    /// Collection image metadata is stored in.
    pub images: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            connection_prefix: DEFAULT_CONNECTION_PREFIX.to_string(),
            messages: MESSAGE_COLLECTION.to_string(),
            images: IMAGE_COLLECTION.to_string(),
        }
    }
}

/// What to do with a chat payload that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Log a warning and drop it; the sender is told nothing.
    #[default]
    Drop,
    /// Refuse it at the entry point and report the parse error to the sender.
    Reject,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected `drop` or `reject`, got `{other}`")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the WebSocket connection gateway.
    /// Env: `WS_ADDR`
    /// Default: `0.0.0.0:8080`
    pub ws_addr: SocketAddr,

    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8081`
    pub http_addr: SocketAddr,

    /// SQLite file backing the document store.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// Directory uploaded files are written to.
    /// Env: `UPLOAD_DIR`
    /// Default: `./file-uploads`
    pub upload_dir: PathBuf,

    /// Maximum request body size for uploads, in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 50 MiB
    pub max_upload_size: usize,

    /// Bytes read per chunk when streaming a stored file.
    /// Env: `STREAM_CHUNK_SIZE`
    /// Default: 64 KiB
    pub stream_chunk_size: usize,

    /// Outbound queue depth of each live connection.
    /// Env: `CHANNEL_CAPACITY`
    /// Default: `256`
    pub channel_capacity: usize,

    /// Env: `MALFORMED_MESSAGE_POLICY` (`drop` / `reject`)
    /// Default: `drop`
    pub malformed_policy: MalformedPolicy,

    /// Env: `CONNECTION_PREFIX` overrides `topics.connection_prefix`.
    pub topics: Topics,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: ([0, 0, 0, 0], DEFAULT_WS_PORT).into(),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./parley.db"),
            upload_dir: PathBuf::from("./file-uploads"),
            max_upload_size: MAX_UPLOAD_SIZE,
            stream_chunk_size: STREAM_CHUNK_SIZE,
            channel_capacity: CHANNEL_CAPACITY,
            malformed_policy: MalformedPolicy::Drop,
            topics: Topics::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "WS_ADDR", &mut config.ws_addr);
        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(path);
        }

        parse_into(&lookup, "MAX_UPLOAD_SIZE", &mut config.max_upload_size);
        parse_into(&lookup, "STREAM_CHUNK_SIZE", &mut config.stream_chunk_size);
        parse_into(&lookup, "CHANNEL_CAPACITY", &mut config.channel_capacity);
        parse_into(&lookup, "MALFORMED_MESSAGE_POLICY", &mut config.malformed_policy);

        if let Some(prefix) = lookup("CONNECTION_PREFIX") {
            config.topics.connection_prefix = prefix;
        }

        // Zero would make every connection queue or stream chunk unusable.
        config.stream_chunk_size = config.stream_chunk_size.max(1);
        config.channel_capacity = config.channel_capacity.max(1);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid setting, using default");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.ws_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8081).into());
        assert_eq!(config.topics.connection_prefix, "/token/");
        assert_eq!(config.malformed_policy, MalformedPolicy::Drop);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("UPLOAD_DIR", "/tmp/up"),
            ("MALFORMED_MESSAGE_POLICY", "Reject"),
            ("CONNECTION_PREFIX", "/chat/"),
            ("STREAM_CHUNK_SIZE", "1024"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.malformed_policy, MalformedPolicy::Reject);
        assert_eq!(config.topics.connection_prefix, "/chat/");
        assert_eq!(config.stream_chunk_size, 1024);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("WS_ADDR", "not-an-addr"),
            ("CHANNEL_CAPACITY", "0"),
            ("MALFORMED_MESSAGE_POLICY", "explode"),
        ]);
        assert_eq!(config.ws_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.malformed_policy, MalformedPolicy::Drop);
    }
}
