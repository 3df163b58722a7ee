//! Batch Store
//!
//! Holds the latest merged view of every facet per batch key. Records are
//! tagged with the epoch that created them so that updates from a cancelled
//! or superseded subscription set are recognised and dropped.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{Address, BatchKey, BatchRecord, FacetName, FacetResult};

pub struct BatchStore {
    records: RwLock<HashMap<BatchKey, BatchRecord>>,
    next_epoch: AtomicU64,
}

impl BatchStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Create a record for `key` under a fresh epoch, replacing any existing
    /// one. Every facet in `facets` starts out none-filled. Returns the new
    /// epoch.
    pub async fn begin(&self, key: &BatchKey, addresses: Vec<Address>, facets: &[FacetName]) -> u64 {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let mut record = BatchRecord::new(addresses, epoch);
        for facet in facets {
            record.facet_results.insert(facet.clone(), vec![None; record.addresses.len()]);
        }
        self.records.write().await.insert(key.clone(), record);
        epoch
    }

    /// Replace one facet's values in the record for `key`.
    ///
    /// Returns `false` without touching anything when the record is gone or
    /// belongs to a different epoch.
    pub async fn apply(&self, key: &BatchKey, epoch: u64, facet: &FacetName, mut values: FacetResult) -> bool {
        let mut records = self.records.write().await;
        let record = match records.get_mut(key) {
            Some(record) if record.epoch == epoch => record,
            Some(record) => {
                debug!("Dropping '{}' update for batch '{}': epoch {} superseded by {}", facet, key, epoch, record.epoch);
                return false;
            }
            None => {
                debug!("Dropping '{}' update for batch '{}': batch no longer exists", facet, key);
                return false;
            }
        };

        let expected = record.addresses.len();
        if values.len() != expected {
            warn!(
                "Facet '{}' delivered {} values for {} addresses in batch '{}'; realigning",
                facet, values.len(), expected, key
            );
            values.resize(expected, None);
        }

        record.facet_results.insert(facet.clone(), values);
        record.updated_at.insert(facet.clone(), Utc::now());
        true
    }

    pub async fn contains(&self, key: &BatchKey) -> bool {
        self.records.read().await.contains_key(key)
    }

    /// Snapshot of the record for `key`
    pub async fn get(&self, key: &BatchKey) -> Option<BatchRecord> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn addresses_in(&self, key: &BatchKey) -> Vec<Address> {
        self.records
            .read()
            .await
            .get(key)
            .map(|r| r.addresses.clone())
            .unwrap_or_default()
    }

    pub async fn count_for(&self, key: &BatchKey) -> usize {
        self.records.read().await.get(key).map(|r| r.len()).unwrap_or(0)
    }

    pub async fn remove(&self, key: &BatchKey) -> Option<BatchRecord> {
        self.records.write().await.remove(key)
    }

    /// Remove every record, returning how many were dropped
    pub async fn clear(&self) -> usize {
        let mut records = self.records.write().await;
        let count = records.len();
        records.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for BatchStore {
    fn default() -> Self {
        Self::new()
    }
}
