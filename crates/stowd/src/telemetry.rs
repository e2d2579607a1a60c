//! Logging setup for the Stow daemon.

use tracing_subscriber::EnvFilter;

/// Install the console `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured `level` when set. Call once at
/// startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
