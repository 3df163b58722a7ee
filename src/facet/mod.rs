//! Facet Module
//!
//! A facet is one category of per-address metadata fed by its own live
//! subscription. Each facet opens a single multiplexed subscription for a
//! batch and writes every snapshot it receives into the batch store.

pub mod value;
pub mod subscriber;
pub mod dependent;
pub mod standard;

pub use value::{Decoder, FacetValue, Identity, PoolId, PoolMembership, SubIdentityOf};
pub use subscriber::FacetSubscriber;
pub use dependent::DependentFacetResolver;
pub use standard::pool_member_facets;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::batch::{Address, BatchKey, BatchStore, FacetName, FacetResult};
use crate::error::{MetaError, MetaResult};
use crate::transport::{Snapshot, Unsubscribe};

/// Everything a facet needs to feed one batch epoch
#[derive(Clone)]
pub struct FacetContext {
    pub key: BatchKey,
    pub epoch: u64,
    pub addresses: Arc<Vec<Address>>,
    pub store: Arc<BatchStore>,
}

#[async_trait]
pub trait Facet: Send + Sync {
    /// Name under which results are stored in the batch record
    fn name(&self) -> &FacetName;

    /// Open the facet's subscription for `ctx`.
    ///
    /// Resolves once the subscription is established; updates keep flowing
    /// into the store until the returned handle is cancelled.
    async fn subscribe(&self, ctx: FacetContext) -> MetaResult<Unsubscribe>;
}

/// Attribute a transport failure to `facet`, keeping `NotReady` distinct
pub(crate) fn subscription_error(facet: &FacetName, e: MetaError) -> MetaError {
    match e {
        MetaError::NotReady => MetaError::NotReady,
        other => MetaError::Subscription {
            facet: facet.clone(),
            reason: other.to_string(),
        },
    }
}

/// Decode a raw snapshot into `expected` aligned values. Payloads that fail to
/// decode become `None` in place.
pub(crate) fn decode_snapshot(facet: &FacetName, decode: Decoder, snapshot: Snapshot, expected: usize) -> FacetResult {
    if snapshot.len() != expected {
        warn!("Facet '{}' snapshot has {} entries, expected {}", facet, snapshot.len(), expected);
    }
    let mut values: FacetResult = snapshot
        .into_iter()
        .take(expected)
        .map(|raw| match raw {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => match decode(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Facet '{}' could not decode payload: {}", facet, e);
                    None
                }
            },
        })
        .collect();
    values.resize(expected, None);
    values
}
