//! Runtime Configuration
//!
//! Settings are read from an optional YAML file and then overridden by
//! `META_BATCH_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::{MetaError, MetaResult};

pub const ENV_STAGE_TWO_TIMEOUT_MS: &str = "META_BATCH_STAGE_TWO_TIMEOUT_MS";
pub const ENV_SUBSCRIBE_TIMEOUT_MS: &str = "META_BATCH_SUBSCRIBE_TIMEOUT_MS";
pub const ENV_EVENT_BUS_CAPACITY: &str = "META_BATCH_EVENT_BUS_CAPACITY";
pub const ENV_LOG: &str = "META_BATCH_LOG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetaConfig {
    /// Deadline for the one-shot dependent lookup of a resolver facet
    pub stage_two_timeout_ms: u64,
    /// Deadline for one facet subscription to be established
    pub subscribe_timeout_ms: u64,
    /// Capacity of the connection event broadcast channel
    pub event_bus_capacity: usize,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            stage_two_timeout_ms: 5_000,
            subscribe_timeout_ms: 10_000,
            event_bus_capacity: 1024,
            log_filter: "meta_batch=info".to_string(),
        }
    }
}

impl MetaConfig {
    /// Load from a YAML file, falling back to defaults when it does not exist
    pub async fn load(path: impl AsRef<Path>) -> MetaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `META_BATCH_*` overrides from the process environment
    pub fn apply_env(mut self) -> MetaResult<Self> {
        if let Ok(raw) = std::env::var(ENV_STAGE_TWO_TIMEOUT_MS) {
            self.stage_two_timeout_ms = raw
                .parse()
                .map_err(|_| MetaError::Config(format!("{} must be an integer, got '{}'", ENV_STAGE_TWO_TIMEOUT_MS, raw)))?;
        }
        if let Ok(raw) = std::env::var(ENV_SUBSCRIBE_TIMEOUT_MS) {
            self.subscribe_timeout_ms = raw
                .parse()
                .map_err(|_| MetaError::Config(format!("{} must be an integer, got '{}'", ENV_SUBSCRIBE_TIMEOUT_MS, raw)))?;
        }
        if let Ok(raw) = std::env::var(ENV_EVENT_BUS_CAPACITY) {
            self.event_bus_capacity = raw
                .parse()
                .map_err(|_| MetaError::Config(format!("{} must be an integer, got '{}'", ENV_EVENT_BUS_CAPACITY, raw)))?;
        }
        if let Ok(filter) = std::env::var(ENV_LOG) {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn stage_two_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_two_timeout_ms)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    fn validate(&self) -> MetaResult<()> {
        if self.stage_two_timeout_ms == 0 {
            return Err(MetaError::Config("stage_two_timeout_ms must be positive".to_string()));
        }
        if self.subscribe_timeout_ms == 0 {
            return Err(MetaError::Config("subscribe_timeout_ms must be positive".to_string()));
        }
        // tokio's broadcast channel panics on a zero capacity
        if self.event_bus_capacity == 0 {
            return Err(MetaError::Config("event_bus_capacity must be positive".to_string()));
        }
        Ok(())
    }
}
