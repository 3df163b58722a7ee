//! Account & Network Collaborator
//!
//! Read access to the active account and network, plus an in-memory state
//! holder that announces every change on the [`EventBus`]. Invalidation is
//! driven by those events rather than by callers watching the state.

pub mod event_bus;
pub mod watcher;

pub use event_bus::{ConnectionEvent, EventBus};
pub use watcher::InvalidationWatcher;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::batch::Address;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait AccountNetwork: Send + Sync {
    /// Address of the connected account, if any
    fn active_address(&self) -> Option<Address>;

    fn current_network_id(&self) -> NetworkId;
}

pub struct ConnectionState {
    active: RwLock<Option<Address>>,
    network: RwLock<NetworkId>,
    bus: Arc<EventBus>,
}

impl ConnectionState {
    pub fn new(network: NetworkId, bus: Arc<EventBus>) -> Self {
        Self {
            active: RwLock::new(None),
            network: RwLock::new(network),
            bus,
        }
    }

    /// Make `address` the active account
    pub fn connect_to_account(&self, address: impl Into<Address>) {
        self.set_active(Some(address.into()));
    }

    pub fn disconnect(&self) {
        self.set_active(None);
    }

    pub fn switch_network(&self, network: NetworkId) {
        {
            let mut current = self.network.write().unwrap_or_else(|p| p.into_inner());
            if *current == network {
                return;
            }
            info!("Switching network {} -> {}", current, network);
            *current = network.clone();
        }
        // A new network invalidates the account selection too
        self.set_active(None);
        self.bus.publish(ConnectionEvent::NetworkChanged(network));
    }

    fn set_active(&self, address: Option<Address>) {
        {
            let mut active = self.active.write().unwrap_or_else(|p| p.into_inner());
            if *active == address {
                return;
            }
            *active = address.clone();
        }
        self.bus.publish(ConnectionEvent::ActiveAccountChanged(address));
    }
}

impl AccountNetwork for ConnectionState {
    fn active_address(&self) -> Option<Address> {
        self.active.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn current_network_id(&self) -> NetworkId {
        self.network.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
