//! Facet set for pool member lists: membership, on-chain identity, and the
//! identity of each member's parent account.

use std::sync::Arc;

use super::{DependentFacetResolver, Facet, FacetSubscriber, FacetValue};
use crate::batch::FacetName;
use crate::config::MetaConfig;
use crate::transport::{QueryDescriptor, RemoteQueryClient};

pub const MEMBERS: &str = "members";
pub const IDENTITIES: &str = "identities";
pub const SUPER_IDENTITIES: &str = "super_identities";

pub fn pool_members_query() -> QueryDescriptor {
    QueryDescriptor::new("nominationPools", "poolMembers")
}

pub fn identity_of_query() -> QueryDescriptor {
    QueryDescriptor::new("identity", "identityOf")
}

pub fn super_of_query() -> QueryDescriptor {
    QueryDescriptor::new("identity", "superOf")
}

pub fn members() -> FacetName {
    FacetName::new(MEMBERS)
}

pub fn identities() -> FacetName {
    FacetName::new(IDENTITIES)
}

pub fn super_identities() -> FacetName {
    FacetName::new(SUPER_IDENTITIES)
}

pub fn pool_member_facets(client: Arc<dyn RemoteQueryClient>, config: &MetaConfig) -> Vec<Arc<dyn Facet>> {
    vec![
        Arc::new(FacetSubscriber::new(
            IDENTITIES,
            identity_of_query(),
            FacetValue::decode_identity,
            client.clone(),
        )),
        Arc::new(DependentFacetResolver::new(
            SUPER_IDENTITIES,
            (super_of_query(), FacetValue::decode_sub_identity),
            (identity_of_query(), FacetValue::decode_identity),
            client.clone(),
            config.stage_two_timeout(),
        )),
        Arc::new(FacetSubscriber::new(
            MEMBERS,
            pool_members_query(),
            FacetValue::decode_member,
            client,
        )),
    ]
}
