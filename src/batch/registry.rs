//! Subscription Registry
//!
//! Tracks the open cancellation handles of every batch key so a whole batch,
//! or every batch, can be unsubscribed in one call.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::BatchKey;
use crate::transport::Unsubscribe;

pub struct SubscriptionRegistry {
    handles: Mutex<HashMap<BatchKey, Vec<Unsubscribe>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Append handles to the set for `key`
    pub async fn add(&self, key: &BatchKey, handles: Vec<Unsubscribe>) {
        if handles.is_empty() {
            return;
        }
        let mut map = self.handles.lock().await;
        map.entry(key.clone()).or_default().extend(handles);
    }

    /// Cancel and forget every handle for `key`. Returns how many were cancelled.
    pub async fn cancel(&self, key: &BatchKey) -> usize {
        let handles = self.handles.lock().await.remove(key).unwrap_or_default();
        let count = handles.len();
        for handle in handles {
            handle.cancel();
        }
        if count > 0 {
            debug!("Cancelled {} subscriptions for batch '{}'", count, key);
        }
        count
    }

    /// Cancel every handle across all keys
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.handles.lock().await.drain().collect();
        let mut count = 0;
        for (_, handles) in drained {
            count += handles.len();
            for handle in handles {
                handle.cancel();
            }
        }
        count
    }

    /// Number of live handles for `key`
    pub async fn count(&self, key: &BatchKey) -> usize {
        self.handles.lock().await.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Number of live handles across all keys
    pub async fn total(&self) -> usize {
        self.handles.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.total().await == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
