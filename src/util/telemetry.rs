//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "loanq=info";

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
