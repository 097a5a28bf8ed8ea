//! # parley-shared
//!
//! Wire types shared by the Parley relay: the chat message payload routed
//! between connections and the `{result}` / `{error}` reply envelope used on
//! every synchronous response path.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod protocol;

pub use envelope::Reply;
pub use error::ProtocolError;
pub use protocol::ChatMessage;
