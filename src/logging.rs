//! Logging configuration
//!
//! Structured logging with tracing.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "onionmeet=info";

/// Initialize logging with environment-based filtering
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize logging with specific level
///
/// `RUST_LOG` is ignored here; the level applies to this crate only.
pub fn init_with_level(level: Level) {
    let filter = EnvFilter::new(format!("onionmeet={}", level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
