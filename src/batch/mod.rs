//! Batch Module
//!
//! Named groups of addresses, the merged per-batch records, the registry of
//! live subscription handles, and the controller that ties them together.

pub mod types;
pub mod store;
pub mod registry;
pub mod controller;

pub use types::{Address, BatchKey, BatchRecord, FacetName, FacetResult};
pub use store::BatchStore;
pub use registry::SubscriptionRegistry;
pub use controller::{BatchController, EnsureOutcome};
