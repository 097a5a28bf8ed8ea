//! # parley-store
//!
//! Durable document storage for the Parley relay.
//!
//! Records are schemaless JSON objects grouped into named collections. The
//! crate exposes the synchronous [`DocumentStore`] trait with a SQLite
//! implementation ([`Database`]) and an in-memory one ([`MemoryStore`]), plus
//! [`StoreGateway`], which moves a store onto its own blocking thread and
//! hands out a cloneable async [`StoreHandle`].

pub mod database;
pub mod documents;
pub mod gateway;
pub mod memory;
pub mod migrations;
pub mod store;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use gateway::{StoreGateway, StoreHandle};
pub use memory::MemoryStore;
pub use store::DocumentStore;
