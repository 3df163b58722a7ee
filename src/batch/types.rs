use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::facet::FacetValue;

/// Opaque identifier of a remote entity. Compared by exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of a group of addresses sharing one subscription lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchKey(String);

impl BatchKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BatchKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of one category of metadata tracked per address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetName(String);

impl FacetName {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacetName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Per-address facet values, index `i` belongs to `addresses[i]`
pub type FacetResult = Vec<Option<FacetValue>>;

/// Merged view of every facet for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Fixed for the lifetime of the epoch
    pub addresses: Vec<Address>,
    /// One entry per configured facet, none-filled until it delivers
    pub facet_results: HashMap<FacetName, FacetResult>,
    /// Subscription epoch that owns this record
    pub epoch: u64,
    pub created_at: DateTime<Utc>,
    /// Time of the latest applied update, per facet
    pub updated_at: HashMap<FacetName, DateTime<Utc>>,
}

impl BatchRecord {
    pub fn new(addresses: Vec<Address>, epoch: u64) -> Self {
        Self {
            addresses,
            facet_results: HashMap::new(),
            epoch,
            created_at: Utc::now(),
            updated_at: HashMap::new(),
        }
    }

    /// Values of a facet. Facets configured for the batch are none-filled
    /// until their first update; unknown facets give `None`.
    pub fn facet(&self, name: &FacetName) -> Option<&FacetResult> {
        self.facet_results.get(name)
    }

    /// Values of a facet, all-`None` when the facet is unknown to the batch
    pub fn facet_or_empty(&self, name: &FacetName) -> FacetResult {
        self.facet_results
            .get(name)
            .cloned()
            .unwrap_or_else(|| vec![None; self.addresses.len()])
    }

    /// Value of a facet for a single address
    pub fn value_for(&self, name: &FacetName, address: &Address) -> Option<&FacetValue> {
        let index = self.addresses.iter().position(|a| a == address)?;
        self.facet_results.get(name)?.get(index)?.as_ref()
    }

    /// Whether the facet has applied at least one update
    pub fn has_delivered(&self, name: &FacetName) -> bool {
        self.updated_at.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
