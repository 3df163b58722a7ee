//! Connection Event Bus
//!
//! Asynchronous pub/sub channel carrying account, network and transport
//! changes to whoever has to invalidate state in response.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::NetworkId;
use crate::batch::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ConnectionEvent {
    /// The client switched to another network
    NetworkChanged(NetworkId),
    /// The active account changed or was disconnected
    ActiveAccountChanged(Option<Address>),
    /// The remote query client became usable
    TransportReady,
    /// The remote query client went away
    TransportLost,
}

pub struct EventBus {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }

    /// Create a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
