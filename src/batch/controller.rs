//! Batch Lifecycle Controller
//!
//! Decides, per request, whether a batch needs new subscriptions, tears down
//! stale ones, fans out every configured facet, and records the resulting
//! handles. Lifecycle operations (ensure, cancel, reset) are serialized so a
//! teardown always completes before the next epoch for a key is launched.
//! Opening a facet subscription is bounded by a deadline, so a stalled
//! transport cannot hold the lifecycle lock.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::registry::SubscriptionRegistry;
use super::store::BatchStore;
use super::types::{Address, BatchKey, BatchRecord, FacetName};
use crate::config::MetaConfig;
use crate::error::MetaError;
use crate::facet::{Facet, FacetContext};
use crate::transport::RemoteQueryClient;

/// What an `ensure_batch` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Empty key or empty address list
    Ignored,
    /// Transport unavailable; nothing was created
    NotReady,
    /// Batch already subscribed and no refetch was requested
    AlreadyPresent,
    /// A new epoch was started
    Subscribed { handles: usize, failed: Vec<FacetName> },
}

pub struct BatchController {
    client: Arc<dyn RemoteQueryClient>,
    facets: Vec<Arc<dyn Facet>>,
    store: Arc<BatchStore>,
    registry: SubscriptionRegistry,
    lifecycle: Mutex<()>,
    subscribe_timeout: Duration,
}

impl BatchController {
    pub fn new(client: Arc<dyn RemoteQueryClient>, facets: Vec<Arc<dyn Facet>>) -> Self {
        Self {
            client,
            facets,
            store: Arc::new(BatchStore::new()),
            registry: SubscriptionRegistry::new(),
            lifecycle: Mutex::new(()),
            subscribe_timeout: MetaConfig::default().subscribe_timeout(),
        }
    }

    /// Deadline for each facet subscription to be established
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Names of the configured facets, in launch order
    pub fn facet_names(&self) -> Vec<FacetName> {
        self.facets.iter().map(|f| f.name().clone()).collect()
    }

    /// Make sure `key` has live subscriptions for every facet over `addresses`.
    ///
    /// Without `force_refetch` an existing batch is left untouched. With it,
    /// the existing batch is cancelled and removed first.
    pub async fn ensure_batch(&self, key: impl Into<BatchKey>, addresses: Vec<Address>, force_refetch: bool) -> EnsureOutcome {
        let key = key.into();
        if key.is_empty() || addresses.is_empty() {
            return EnsureOutcome::Ignored;
        }

        let _lifecycle = self.lifecycle.lock().await;
        if !self.client.is_ready() {
            debug!("Transport not ready, skipping batch '{}'", key);
            return EnsureOutcome::NotReady;
        }

        if force_refetch {
            self.teardown(&key).await;
        } else if self.store.contains(&key).await {
            return EnsureOutcome::AlreadyPresent;
        }

        let epoch = self.store.begin(&key, addresses.clone(), &self.facet_names()).await;
        let ctx = FacetContext {
            key: key.clone(),
            epoch,
            addresses: Arc::new(addresses),
            store: self.store.clone(),
        };

        let timeout = self.subscribe_timeout;
        let results = join_all(self.facets.iter().map(|facet| {
            let ctx = ctx.clone();
            async move {
                let name = facet.name().clone();
                let result = match tokio::time::timeout(timeout, facet.subscribe(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(MetaError::Subscription {
                        facet: name.clone(),
                        reason: MetaError::Timeout(timeout.as_millis() as u64).to_string(),
                    }),
                };
                (name, result)
            }
        }))
        .await;

        let mut handles = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        let mut not_ready = 0;
        for (name, result) in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    if matches!(e, MetaError::NotReady) {
                        not_ready += 1;
                    }
                    warn!("Facet '{}' unavailable for batch '{}': {}", name, key, e);
                    failed.push(name);
                }
            }
        }

        // Transport dropped while subscribing: leave no partial batch behind
        if handles.is_empty() && not_ready > 0 && !self.client.is_ready() {
            self.store.remove(&key).await;
            return EnsureOutcome::NotReady;
        }

        let count = handles.len();
        self.registry.add(&key, handles).await;
        info!(
            "Batch '{}' subscribed (epoch {}, {} facets live, {} failed)",
            key, epoch, count, failed.len()
        );
        EnsureOutcome::Subscribed { handles: count, failed }
    }

    /// Cancel every subscription of `key` and drop its record
    pub async fn cancel_and_clear(&self, key: &BatchKey) -> usize {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown(key).await
    }

    /// Cancel every batch and empty the store
    pub async fn reset_all(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let records = self.store.clear().await;
        let handles = self.registry.cancel_all().await;
        if records > 0 || handles > 0 {
            info!("Reset {} batches ({} subscriptions cancelled)", records, handles);
        }
    }

    pub async fn get_batch(&self, key: &BatchKey) -> Option<BatchRecord> {
        self.store.get(key).await
    }

    pub async fn addresses_in(&self, key: &BatchKey) -> Vec<Address> {
        self.store.addresses_in(key).await
    }

    /// Number of addresses in the batch, zero when absent
    pub async fn count_for(&self, key: &BatchKey) -> usize {
        self.store.count_for(key).await
    }

    /// Number of live subscription handles held for `key`
    pub async fn live_handles(&self, key: &BatchKey) -> usize {
        self.registry.count(key).await
    }

    // Record goes first so anything still in flight finds nothing to update.
    async fn teardown(&self, key: &BatchKey) -> usize {
        let removed = self.store.remove(key).await.is_some();
        let cancelled = self.registry.cancel(key).await;
        if removed {
            debug!("Tore down batch '{}' ({} subscriptions)", key, cancelled);
        }
        cancelled
    }
}
