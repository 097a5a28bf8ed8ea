//! Address → connection channel registry.
//!
//! Every live connection owns one bounded outbound queue, registered under
//! the connection's address. Publishing is a non-blocking `try_send` done
//! while holding the read lock, and registration changes take the write lock,
//! so once `unregister` returns no later publish can reach that connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

/// Identifies one accepted connection for the lifetime of the process.
pub type ConnectionId = u64;

/// A payload pushed to a connection.
#[derive(Debug)]
pub struct Delivery {
    pub payload: String,
    /// Completed once the payload has been written to the transport.
    pub ack: oneshot::Sender<()>,
}

/// Result of a publish attempt. None of these are errors to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    NoSubscriber,
    /// The connection's queue is full or already closed.
    Dropped,
}

/// What a publisher gets back.
#[derive(Debug)]
pub struct Receipt {
    pub outcome: PublishOutcome,
    /// Resolves once the connection has written the payload out. Only
    /// present when the payload was queued.
    pub written: Option<oneshot::Receiver<()>>,
}

struct Registration {
    id: ConnectionId,
    tx: mpsc::Sender<Delivery>,
}

/// The receiving half handed to a connection on registration.
pub struct Subscription {
    pub id: ConnectionId,
    pub address: String,
    pub rx: mpsc::Receiver<Delivery>,
}

#[derive(Clone)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<HashMap<String, Registration>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl ChannelRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Register a channel for `address`.
    ///
    /// A previous registration for the same address is replaced. Its queue is
    /// closed, which the displaced connection observes as the end of its
    /// subscription.
    pub async fn register(&self, address: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let previous = self
            .channels
            .write()
            .await
            .insert(address.to_string(), Registration { id, tx });

        match previous {
            Some(old) => info!(
                address,
                conn = id,
                replaced = old.id,
                "Channel registered, replacing previous connection"
            ),
            None => debug!(address, conn = id, "Channel registered"),
        }

        Subscription {
            id,
            address: address.to_string(),
            rx,
        }
    }

    /// Remove the registration of connection `id` for `address`.
    ///
    /// Returns `false` when there is nothing to remove, either because it was
    /// already removed or because a newer connection now holds the address.
    pub async fn unregister(&self, address: &str, id: ConnectionId) -> bool {
        let mut channels = self.channels.write().await;
        match channels.get(address) {
            Some(registration) if registration.id == id => {
                channels.remove(address);
                debug!(address, conn = id, "Channel unregistered");
                true
            }
            _ => false,
        }
    }

    /// Best-effort delivery of `payload` to the connection at `address`.
    pub async fn publish(&self, address: &str, payload: String) -> Receipt {
        let (ack, written) = oneshot::channel();
        let outcome = self.push(address, Delivery { payload, ack }).await;
        Receipt {
            outcome,
            written: (outcome == PublishOutcome::Delivered).then_some(written),
        }
    }

    async fn push(&self, address: &str, delivery: Delivery) -> PublishOutcome {
        let channels = self.channels.read().await;
        let Some(registration) = channels.get(address) else {
            return PublishOutcome::NoSubscriber;
        };

        match registration.tx.try_send(delivery) {
            Ok(()) => PublishOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(address, conn = registration.id, "Dropping message for slow connection");
                PublishOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => PublishOutcome::Dropped,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
