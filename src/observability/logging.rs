//! Structured logging.
//!
//! # Design Decisions
//! - `tracing` structured events throughout the crate
//! - Filter comes from `RUST_LOG` when set, the config level otherwise

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber. Call once, before any listener binds.
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hostwire={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
