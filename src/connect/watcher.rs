//! Invalidation Watcher
//!
//! Listens on the connection [`EventBus`](super::EventBus) and drops every
//! piece of state that no longer describes the current account, network or
//! transport.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ConnectionEvent, NetworkId};
use crate::batch::BatchController;
use crate::members::PoolMembers;
use crate::transport::RemoteQueryClient;

pub struct InvalidationWatcher {
    controller: Arc<BatchController>,
    members: Arc<PoolMembers>,
    client: Arc<dyn RemoteQueryClient>,
    network: Option<NetworkId>,
}

impl InvalidationWatcher {
    pub fn new(controller: Arc<BatchController>, members: Arc<PoolMembers>, client: Arc<dyn RemoteQueryClient>) -> Self {
        Self {
            controller,
            members,
            client,
            network: None,
        }
    }

    /// Seed the network the current state belongs to
    pub fn with_network(mut self, network: NetworkId) -> Self {
        self.network = Some(network);
        self
    }

    pub async fn handle(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::NetworkChanged(network) => {
                if self.network.as_ref() == Some(&network) {
                    debug!("Network {} unchanged", network);
                    return;
                }
                info!("Network changed to {}, dropping all batches", network);
                self.network = Some(network);
                self.controller.reset_all().await;
                self.members.clear().await;
            }
            ConnectionEvent::ActiveAccountChanged(account) => {
                debug!("Active account now {:?}", account.as_ref().map(|a| a.as_str()));
                self.controller.reset_all().await;
            }
            ConnectionEvent::TransportReady => {
                if let Err(e) = self.members.fetch_all(self.client.as_ref()).await {
                    error!("Pool member fetch failed: {}", e);
                }
            }
            ConnectionEvent::TransportLost => {
                warn!("Transport lost, dropping all batches");
                self.members.clear().await;
                self.controller.reset_all().await;
            }
        }
    }

    /// Run until the bus closes
    pub fn spawn(mut self, mut rx: broadcast::Receiver<ConnectionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events may have invalidated anything
                        warn!("Invalidation watcher lagged by {} events, resetting", skipped);
                        self.controller.reset_all().await;
                        self.members.clear().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Invalidation watcher stopped");
        })
    }
}
