//! Dependent Facet Resolver
//!
//! A facet whose values point at other entities. Every stage-one snapshot
//! triggers a one-shot stage-two subscription over the referenced keys; its
//! first result is injected into the stage-one values before the merged
//! array is committed. Snapshots are handled one at a time so stage-two data
//! is never laid over a newer stage-one snapshot.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{decode_snapshot, subscription_error, Decoder, Facet, FacetContext};
use crate::batch::{Address, FacetName, FacetResult};
use crate::error::{MetaError, MetaResult};
use crate::transport::{LiveSubscription, QueryDescriptor, RemoteQueryClient, Unsubscribe};

pub struct DependentFacetResolver {
    name: FacetName,
    stage_one: QueryDescriptor,
    stage_two: QueryDescriptor,
    decode_stage_one: Decoder,
    decode_stage_two: Decoder,
    client: Arc<dyn RemoteQueryClient>,
    stage_two_timeout: Duration,
}

impl DependentFacetResolver {
    pub fn new(
        name: impl Into<FacetName>,
        stage_one: (QueryDescriptor, Decoder),
        stage_two: (QueryDescriptor, Decoder),
        client: Arc<dyn RemoteQueryClient>,
        stage_two_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            stage_one: stage_one.0,
            stage_two: stage_two.0,
            decode_stage_one: stage_one.1,
            decode_stage_two: stage_two.1,
            client,
            stage_two_timeout,
        }
    }
}

#[async_trait]
impl Facet for DependentFacetResolver {
    fn name(&self) -> &FacetName {
        &self.name
    }

    async fn subscribe(&self, ctx: FacetContext) -> MetaResult<Unsubscribe> {
        let LiveSubscription { handle, mut updates } = self
            .client
            .subscribe_multi(&self.stage_one, &ctx.addresses)
            .await
            .map_err(|e| subscription_error(&self.name, e))?;

        let lookup = StageTwo {
            facet: self.name.clone(),
            query: self.stage_two.clone(),
            decode: self.decode_stage_two,
            client: self.client.clone(),
            timeout: self.stage_two_timeout,
        };
        let decode = self.decode_stage_one;
        let task = tokio::spawn(async move {
            while let Some(snapshot) = updates.recv().await {
                let mut values = decode_snapshot(&lookup.facet, decode, snapshot, ctx.addresses.len());
                lookup.inject(&mut values).await;
                if !ctx.store.apply(&ctx.key, ctx.epoch, &lookup.facet, values).await {
                    break;
                }
            }
            debug!("Dependent facet '{}' feed for batch '{}' (epoch {}) stopped", lookup.facet, ctx.key, ctx.epoch);
        });

        Ok(Unsubscribe::new(move || {
            handle.cancel();
            task.abort();
        }))
    }
}

struct StageTwo {
    facet: FacetName,
    query: QueryDescriptor,
    decode: Decoder,
    client: Arc<dyn RemoteQueryClient>,
    timeout: Duration,
}

impl StageTwo {
    /// Fill nested fields of `values` in place. On failure the values are
    /// left as stage one delivered them.
    async fn inject(&self, values: &mut FacetResult) {
        let (indices, keys): (Vec<usize>, Vec<Address>) = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref()?.dependent_key().map(|k| (i, k.clone())))
            .unzip();
        if keys.is_empty() {
            return;
        }

        match self.lookup(&keys).await {
            Ok(nested) => {
                for (index, found) in indices.into_iter().zip(nested) {
                    if let (Some(value), Some(found)) = (values[index].as_mut(), found) {
                        value.attach_nested(found);
                    }
                }
            }
            Err(e) => warn!("Facet '{}' keeps stage one values only: {}", self.facet, e),
        }
    }

    /// Open, read once, and close a subscription over `keys`. The deadline
    /// covers establishing the subscription as well as its first update.
    async fn lookup(&self, keys: &[Address]) -> MetaResult<FacetResult> {
        match tokio::time::timeout(self.timeout, self.first_snapshot(keys)).await {
            Ok(result) => result,
            Err(_) => Err(MetaError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    async fn first_snapshot(&self, keys: &[Address]) -> MetaResult<FacetResult> {
        let LiveSubscription { handle, mut updates } = self
            .client
            .subscribe_multi(&self.query, keys)
            .await
            .map_err(|e| MetaError::StageTwo(e.to_string()))?;

        // Closes the subscription on every exit, including a dropped future
        let _guard = CancelOnDrop(Some(handle));
        match updates.recv().await {
            Some(snapshot) => Ok(decode_snapshot(&self.facet, self.decode, snapshot, keys.len())),
            None => Err(MetaError::StageTwo("subscription closed before delivering".to_string())),
        }
    }
}

struct CancelOnDrop(Option<Unsubscribe>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}
