//! Tracing setup for the embedding process.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter from LOG_LEVEL, then RUST_LOG, defaulting to `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a JSON tracing subscriber as the global default.
///
/// Panics if a global subscriber is already set; use [`try_init`] when that
/// can happen.
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Like [`init`], but returns an error instead of panicking when a global
/// subscriber is already installed.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error_not_a_panic() {
        // Whichever call runs first may win; the second must fail cleanly
        let _ = try_init();
        assert!(try_init().is_err());
    }
}
