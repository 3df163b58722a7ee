//! Error Types
//!
//! Failures that can surface from the transport, facet subscriptions and
//! configuration loading. Most of these are logged and absorbed by the batch
//! controller rather than returned to callers.

use thiserror::Error;

use crate::batch::FacetName;

#[derive(Debug, Error)]
pub enum MetaError {
    /// The remote query client is not connected yet
    #[error("remote query client is not ready")]
    NotReady,

    /// The transport rejected or failed a subscribe call
    #[error("subscription for facet '{facet}' failed: {reason}")]
    Subscription { facet: FacetName, reason: String },

    /// The transport refused or dropped a request
    #[error("transport error: {0}")]
    Transport(String),

    /// The one-shot dependent lookup failed
    #[error("stage two lookup failed: {0}")]
    StageTwo(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// A payload did not match the shape expected for its facet
    #[error("could not decode payload: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type MetaResult<T> = std::result::Result<T, MetaError>;
