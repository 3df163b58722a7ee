//! Remote Query Transport
//!
//! The boundary to the live-query client. The batch machinery only needs
//! multiplexed subscriptions, one-shot lookups, map enumeration and a
//! readiness flag; how those are served is up to the implementation.

pub mod memory;

pub use memory::InMemoryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use crate::batch::Address;
use crate::error::MetaResult;

/// Identifies one remote storage query, e.g. `identity.identityOf`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub section: String,
    pub method: String,
}

impl QueryDescriptor {
    pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
        }
    }

    /// Parse the dotted `section.method` form
    pub fn parse(path: &str) -> Option<Self> {
        let (section, method) = path.split_once('.')?;
        if section.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self::new(section, method))
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.method)
    }
}

/// One full update of a multiplexed subscription, aligned with the
/// subscribed address list. `None` marks an address with no stored value.
pub type Snapshot = Vec<Option<Value>>;

/// Cancellation handle for a live subscription.
///
/// Dropping the handle without calling [`Unsubscribe::cancel`] leaves the
/// subscription running.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn cancel(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// An established subscription: its handle plus the stream of snapshots
#[derive(Debug)]
pub struct LiveSubscription {
    pub handle: Unsubscribe,
    pub updates: mpsc::UnboundedReceiver<Snapshot>,
}

/// Already-connected client of the remote data source.
#[async_trait]
pub trait RemoteQueryClient: Send + Sync {
    /// Whether the transport can currently serve requests
    fn is_ready(&self) -> bool;

    /// Open one live subscription over every address at once. Resolves when
    /// the subscription is established; snapshots arrive on `updates`.
    async fn subscribe_multi(&self, query: &QueryDescriptor, addresses: &[Address]) -> MetaResult<LiveSubscription>;

    /// One-shot, non-subscribing lookup of a single value
    async fn query_single_once(&self, query: &QueryDescriptor, address: &Address) -> MetaResult<Option<Value>>;

    /// Enumerate every entry stored under a keyed query
    async fn entries(&self, query: &QueryDescriptor) -> MetaResult<Vec<(Address, Value)>>;
}
