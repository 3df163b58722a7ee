//! Plain facet: one multiplexed subscription, every snapshot replaces the
//! facet's values wholesale.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{decode_snapshot, subscription_error, Decoder, Facet, FacetContext};
use crate::batch::FacetName;
use crate::error::MetaResult;
use crate::transport::{LiveSubscription, QueryDescriptor, RemoteQueryClient, Unsubscribe};

pub struct FacetSubscriber {
    name: FacetName,
    query: QueryDescriptor,
    decode: Decoder,
    client: Arc<dyn RemoteQueryClient>,
}

impl FacetSubscriber {
    pub fn new(name: impl Into<FacetName>, query: QueryDescriptor, decode: Decoder, client: Arc<dyn RemoteQueryClient>) -> Self {
        Self {
            name: name.into(),
            query,
            decode,
            client,
        }
    }
}

#[async_trait]
impl Facet for FacetSubscriber {
    fn name(&self) -> &FacetName {
        &self.name
    }

    async fn subscribe(&self, ctx: FacetContext) -> MetaResult<Unsubscribe> {
        let LiveSubscription { handle, mut updates } = self
            .client
            .subscribe_multi(&self.query, &ctx.addresses)
            .await
            .map_err(|e| subscription_error(&self.name, e))?;

        let name = self.name.clone();
        let decode = self.decode;
        let task = tokio::spawn(async move {
            while let Some(snapshot) = updates.recv().await {
                let values = decode_snapshot(&name, decode, snapshot, ctx.addresses.len());
                if !ctx.store.apply(&ctx.key, ctx.epoch, &name, values).await {
                    break;
                }
            }
            debug!("Facet '{}' feed for batch '{}' (epoch {}) stopped", name, ctx.key, ctx.epoch);
        });

        Ok(Unsubscribe::new(move || {
            handle.cancel();
            task.abort();
        }))
    }
}
