// ============================================
// File: crates/kestrel-session/src/logging.rs
// ============================================
//! # Logging Setup
//!
//! `RUST_LOG` overrides the configured level when set. Initializing twice
//! is harmless; the second call is ignored.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initializes the tracing subscriber.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Initializes logging from the `[logging]` section.
pub fn init_from_config(config: &LoggingConfig) {
    init_logging(&config.level);
}
