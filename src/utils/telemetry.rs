//! Logging Setup
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` honouring
//! `RUST_LOG` over a compact fmt layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber. `default_filter` applies when `RUST_LOG` is
/// unset. Returns `false` if a subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
