//! Meta Batch
//!
//! Live, batched per-address metadata over a remote query client:
//! - Named batches of addresses with one subscription per facet
//! - Epoch-guarded result store (no writes after cancellation)
//! - Two-stage dependent facets with a bounded one-shot lookup
//! - Invalidation on account, network and transport changes
//! - Pool member index alongside the metadata batches

pub mod batch;
pub mod config;
pub mod connect;
pub mod error;
pub mod facet;
pub mod members;
pub mod transport;
pub mod utils;

// Re-exports for convenience
pub use batch::{Address, BatchController, BatchKey, BatchRecord, EnsureOutcome, FacetName};
pub use config::MetaConfig;
pub use connect::{AccountNetwork, ConnectionEvent, ConnectionState, EventBus, InvalidationWatcher, NetworkId};
pub use error::{MetaError, MetaResult};
pub use facet::{pool_member_facets, Facet, FacetValue};
pub use members::{PoolMember, PoolMembers};
pub use transport::{InMemoryClient, RemoteQueryClient};
