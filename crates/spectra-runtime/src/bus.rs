// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based dispatch for `sendOneWay` fire-and-forget messages
//! (§4.8). A workflow publishes a [`Dispatch`] naming the target workflow,
//! method, and payload; any number of workflow listeners may subscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// One fire-and-forget message dispatched via `sendOneWay`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Target workflow name, e.g. `"asn-enrichment"`.
    pub target: String,
    /// Method/entry point on the target.
    pub method: String,
    /// JSON-encoded payload.
    pub payload: Value,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped: AtomicU64,
}

/// Broadcast bus distributing [`Dispatch`]es to every subscribed workflow
/// listener, with built-in publish/drop counters.
pub struct MessageBus {
    tx: broadcast::Sender<Dispatch>,
    stats: Arc<StatsInner>,
}

impl MessageBus {
    /// Create a new bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Subscribe to future dispatches.
    #[must_use]
    pub fn subscribe(&self) -> MessageSubscription {
        MessageSubscription {
            rx: self.tx.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Publish a dispatch to all current subscribers. Dispatches are
    /// dropped (and counted) if nobody is listening, matching
    /// `sendOneWay`'s fire-and-forget contract.
    pub fn publish(&self, dispatch: Dispatch) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(dispatch).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Snapshot of bus statistics.
    #[must_use]
    pub fn stats(&self) -> MessageBusStats {
        MessageBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.tx.receiver_count(),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for receiving [`Dispatch`]es from a [`MessageBus`].
pub struct MessageSubscription {
    rx: broadcast::Receiver<Dispatch>,
    stats: Arc<StatsInner>,
}

impl MessageSubscription {
    /// Receive the next dispatch, filtering it by `target` name. Lagged
    /// receivers silently skip forward, counting the loss.
    pub async fn recv_for(&mut self, target: &str) -> Option<Dispatch> {
        loop {
            match self.rx.recv().await {
                Ok(d) if d.target == target => return Some(d),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.dropped.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Snapshot of [`MessageBus`] statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBusStats {
    /// Total dispatches published.
    pub total_published: u64,
    /// Active subscriber count.
    pub active_subscribers: usize,
    /// Dispatches lost to no-subscriber or lag.
    pub dropped: u64,
}
