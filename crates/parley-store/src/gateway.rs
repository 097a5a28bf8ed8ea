//! Async access to a [`DocumentStore`].
//!
//! The store is moved onto a blocking thread that serves requests one at a
//! time from a queue. Callers talk to it through a cloneable [`StoreHandle`];
//! nothing else ever touches the underlying connection.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

/// Depth of the request queue in front of the store thread.
const REQUEST_QUEUE_DEPTH: usize = 1024;

enum StoreRequest {
    Insert {
        collection: String,
        record: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    Query {
        collection: String,
        filter: Value,
        reply: oneshot::Sender<Result<Vec<Value>>>,
    },
}

pub struct StoreGateway;

impl StoreGateway {
    /// Move `store` onto a blocking thread and return a handle to it.
    ///
    /// The thread exits once every handle has been dropped. Must be called
    /// from within a tokio runtime.
    pub fn spawn<S>(mut store: S) -> StoreHandle
    where
        S: DocumentStore + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<StoreRequest>(REQUEST_QUEUE_DEPTH);

        tokio::task::spawn_blocking(move || {
            while let Some(request) = rx.blocking_recv() {
                match request {
                    StoreRequest::Insert {
                        collection,
                        record,
                        reply,
                    } => {
                        let _ = reply.send(store.insert(&collection, record));
                    }
                    StoreRequest::Query {
                        collection,
                        filter,
                        reply,
                    } => {
                        let _ = reply.send(store.query(&collection, &filter));
                    }
                }
            }
            tracing::debug!("store gateway stopped");
        });

        StoreHandle { tx }
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreRequest>,
}

impl StoreHandle {
    /// Insert a record, returning it with its assigned `_id`.
    pub async fn insert(&self, collection: &str, record: Value) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreRequest::Insert {
                collection: collection.to_string(),
                record,
                reply,
            })
            .await
            .map_err(|_| StoreError::GatewayClosed)?;
        rx.await.map_err(|_| StoreError::GatewayClosed)?
    }

    /// Fetch every record in `collection` matching `filter`.
    pub async fn query(&self, collection: &str, filter: Value) -> Result<Vec<Value>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreRequest::Query {
                collection: collection.to_string(),
                filter,
                reply,
            })
            .await
            .map_err(|_| StoreError::GatewayClosed)?;
        rx.await.map_err(|_| StoreError::GatewayClosed)?
    }

    /// Fetch the first record matching `filter`, if any.
    pub async fn find_one(&self, collection: &str, filter: Value) -> Result<Option<Value>> {
        Ok(self.query(collection, filter).await?.into_iter().next())
    }
}
