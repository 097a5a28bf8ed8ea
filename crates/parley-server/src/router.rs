//! Chat message router.
//!
//! A single task receives raw chat payloads, publishes each one to the
//! connection named by its `address` field and hands a copy to a persister
//! task for storage. Senders never hear back about either effect.

use std::time::Duration;

use parley_shared::{ChatMessage, ProtocolError};
use parley_store::StoreHandle;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{MalformedPolicy, Topics};
use crate::registry::{ChannelRegistry, PublishOutcome};

/// Payloads waiting for the router task.
const ROUTER_QUEUE_DEPTH: usize = 1024;

/// Parsed messages waiting to be written to the store.
const PERSIST_QUEUE_DEPTH: usize = 1024;

/// How long a delivery may sit unwritten before it is reported as stalled.
const WRITE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable entry point to the router task.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<String>,
    policy: MalformedPolicy,
}

impl RouterHandle {
    /// Queue a raw payload for routing. Best-effort, no confirmation.
    pub fn route(&self, raw: String) {
        match self.tx.try_send(raw) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Router queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Router is not running, dropping message");
            }
        }
    }

    /// Check a payload at the entry point.
    ///
    /// Under [`MalformedPolicy::Reject`] a payload that does not parse is
    /// refused here so the caller can be told. Under `Drop` everything is
    /// accepted and the router deals with it.
    pub fn admit(&self, raw: &str) -> Result<(), ProtocolError> {
        match self.policy {
            MalformedPolicy::Drop => Ok(()),
            MalformedPolicy::Reject => ChatMessage::parse(raw).map(|_| ()),
        }
    }
}

pub struct MessageRouter {
    registry: ChannelRegistry,
    store: StoreHandle,
    topics: Topics,
    policy: MalformedPolicy,
}

impl MessageRouter {
    pub fn new(
        registry: ChannelRegistry,
        store: StoreHandle,
        topics: Topics,
        policy: MalformedPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            topics,
            policy,
        }
    }

    /// Start the router and its persister, returning the handle to route with.
    pub fn spawn(self) -> RouterHandle {
        let (tx, mut rx) = mpsc::channel::<String>(ROUTER_QUEUE_DEPTH);
        let persist = spawn_persister(self.store.clone(), self.topics.messages.clone());
        let policy = self.policy;

        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                self.dispatch(&raw, &persist).await;
            }
            debug!("Router stopped");
        });

        RouterHandle { tx, policy }
    }

    /// Route one payload. Returns `None` when it was ignored.
    async fn dispatch(
        &self,
        raw: &str,
        persist: &mpsc::Sender<Value>,
    ) -> Option<PublishOutcome> {
        if raw.trim().is_empty() {
            return None;
        }

        let message = match ChatMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, policy = ?self.policy, "Dropping malformed chat message");
                return None;
            }
        };

        let target = message.target(&self.topics.connection_prefix);
        let receipt = self.registry.publish(&target, raw.to_string()).await;
        debug!(address = %target, outcome = ?receipt.outcome, "Routed chat message");

        if let Some(written) = receipt.written {
            tokio::spawn(watch_write(target.clone(), written));
        }

        match persist.try_send(message.to_document()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!(address = %target, "Persist queue full, message not saved");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(address = %target, "Persister is not running, message not saved");
            }
        }

        Some(receipt.outcome)
    }
}

/// Wait for the connection to confirm it wrote a delivery.
///
/// Runs off the routing loop; the outcome is only logged.
async fn watch_write(address: String, written: oneshot::Receiver<()>) -> bool {
    match tokio::time::timeout(WRITE_ACK_TIMEOUT, written).await {
        Ok(Ok(())) => {
            debug!(address = %address, "Delivery written");
            true
        }
        Ok(Err(_)) => {
            debug!(address = %address, "Delivery dropped before it was written");
            false
        }
        Err(_) => {
            debug!(address = %address, "Delivery not written in time");
            false
        }
    }
}

/// Saves messages in the order the router saw them, independently of delivery.
fn spawn_persister(store: StoreHandle, collection: String) -> mpsc::Sender<Value> {
    let (tx, mut rx) = mpsc::channel::<Value>(PERSIST_QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(document) = rx.recv().await {
            match store.insert(&collection, document).await {
                Ok(saved) => info!(id = %saved["_id"], "Message has been successfully saved"),
                Err(e) => error!(error = %e, "Failed to save message"),
            }
        }
    });

    tx
}
