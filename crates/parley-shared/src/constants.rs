/// Default WebSocket (connection gateway) port
pub const DEFAULT_WS_PORT: u16 = 8080;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8081;

/// Path prefix under which clients connect to receive messages for an address
pub const DEFAULT_CONNECTION_PREFIX: &str = "/token/";

/// Document collection holding chat messages
pub const MESSAGE_COLLECTION: &str = "message";

/// Document collection holding image metadata
pub const IMAGE_COLLECTION: &str = "image";

/// Maximum upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Chunk size used when streaming stored files (64 KiB)
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Outbound queue depth per live connection
pub const CHANNEL_CAPACITY: usize = 256;
