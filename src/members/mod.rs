//! Pool Member Index
//!
//! A flat, in-memory list of `(account, pool)` pairs enumerated from the
//! remote pool member map. Batches for a pool are built from
//! [`PoolMembers::members_of_pool`].

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::batch::Address;
use crate::error::MetaResult;
use crate::facet::standard::pool_members_query;
use crate::facet::{FacetValue, PoolId};
use crate::transport::{QueryDescriptor, RemoteQueryClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    pub who: Address,
    pub pool_id: PoolId,
}

pub struct PoolMembers {
    query: QueryDescriptor,
    members: RwLock<Vec<PoolMember>>,
}

impl PoolMembers {
    pub fn new() -> Self {
        Self {
            query: pool_members_query(),
            members: RwLock::new(Vec::new()),
        }
    }

    /// Replace the index with every entry of the remote member map.
    ///
    /// Does nothing and returns zero while the client is not ready.
    pub async fn fetch_all(&self, client: &dyn RemoteQueryClient) -> MetaResult<usize> {
        if !client.is_ready() {
            debug!("Transport not ready, pool member fetch skipped");
            return Ok(0);
        }

        let entries = client.entries(&self.query).await?;
        let mut fetched = Vec::with_capacity(entries.len());
        for (who, raw) in entries {
            match FacetValue::decode_member(&raw) {
                Ok(FacetValue::Member(membership)) => fetched.push(PoolMember {
                    who,
                    pool_id: membership.pool_id,
                }),
                Ok(_) => {}
                Err(e) => warn!("Skipping pool member {}: {}", who, e),
            }
        }

        let count = fetched.len();
        *self.members.write().await = fetched;
        info!("Indexed {} pool members", count);
        Ok(count)
    }

    /// One-shot lookup of a single account, without touching the index
    pub async fn query_member(&self, client: &dyn RemoteQueryClient, who: &Address) -> MetaResult<Option<PoolMember>> {
        if !client.is_ready() {
            return Ok(None);
        }
        let Some(raw) = client.query_single_once(&self.query, who).await? else {
            return Ok(None);
        };
        match FacetValue::decode_member(&raw)? {
            FacetValue::Member(membership) => Ok(Some(PoolMember {
                who: who.clone(),
                pool_id: membership.pool_id,
            })),
            _ => Ok(None),
        }
    }

    /// Addresses of every member of `pool_id`, in index order
    pub async fn members_of_pool(&self, pool_id: PoolId) -> Vec<Address> {
        self.members
            .read()
            .await
            .iter()
            .filter(|m| m.pool_id == pool_id)
            .map(|m| m.who.clone())
            .collect()
    }

    pub async fn get_member(&self, who: &Address) -> Option<PoolMember> {
        self.members.read().await.iter().find(|m| &m.who == who).cloned()
    }

    pub async fn member_count(&self, pool_id: PoolId) -> usize {
        self.members.read().await.iter().filter(|m| m.pool_id == pool_id).count()
    }

    pub async fn all(&self) -> Vec<PoolMember> {
        self.members.read().await.clone()
    }

    /// Add a member unless the account is already indexed
    pub async fn add_one(&self, member: PoolMember) -> bool {
        let mut members = self.members.write().await;
        if members.iter().any(|m| m.who == member.who) {
            return false;
        }
        members.push(member);
        true
    }

    pub async fn remove_one(&self, who: &Address) -> bool {
        let mut members = self.members.write().await;
        let before = members.len();
        members.retain(|m| &m.who != who);
        members.len() != before
    }

    pub async fn clear(&self) {
        self.members.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

impl Default for PoolMembers {
    fn default() -> Self {
        Self::new()
    }
}
