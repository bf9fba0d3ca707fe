//! Live fan-out of freshly built snapshots to streaming subscribers over a
//! bounded tokio broadcast channel. Forward-only: no replay for late
//! joiners, and a subscriber that lags past the buffer is dropped without
//! touching delivery to the others.

use crate::types::MetricsSnapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Snapshots queued per subscriber before a slow one is considered gone.
const SUBSCRIBER_BUFFER: usize = 16;

/// One published collector cycle.
#[derive(Debug, Clone)]
pub struct CycleUpdate {
    pub snapshot: Arc<MetricsSnapshot>,
    /// Set when the cycle's durable append failed; live delivery still
    /// happened, but the store is missing this snapshot.
    pub degraded: bool,
}

#[derive(Clone)]
pub struct MetricsHub {
    sender: Sender<CycleUpdate>,
}

impl MetricsHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self { sender }
    }

    /// Register a new subscriber. Delivery starts with the next published
    /// cycle; nothing earlier is replayed.
    pub fn subscribe(&self) -> Receiver<CycleUpdate> {
        self.sender.subscribe()
    }

    /// Push one cycle to every connected subscriber. Returns how many
    /// received it; zero simply means nobody is listening right now.
    pub fn publish(&self, update: CycleUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new()
    }
}
