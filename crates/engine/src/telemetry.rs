//! Tracing initialization for binaries and integration tests

use tracing::subscriber::SetGlobalDefaultError;

/// Initialize a global tracing subscriber honoring `RUST_LOG`. Returns an
/// error when a subscriber is already installed; callers that share a
/// process (tests) can ignore it.
pub fn init_tracing(default_filter: &str) -> Result<(), SetGlobalDefaultError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber)
}
