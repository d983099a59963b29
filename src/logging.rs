//! Structured logging initialization.
//!
//! The core never formats user-facing messages; it emits structured
//! `tracing` events and leaves presentation to whoever embeds the engine.
//! This helper wires a sensible subscriber for binaries and tests; library
//! users with their own subscriber simply skip it.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize a fmt subscriber honoring `RUST_LOG` (default `info`).
///
/// Safe to call repeatedly; only the first call installs a subscriber, and
/// an already-installed global subscriber is left in place.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .try_init();

        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed, keeping it");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging();
        init_logging();
    }
}
