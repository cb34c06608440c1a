//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Build the subscriber filter for the configured `level`.
///
/// `RUST_LOG`, when set, wins outright. Otherwise the level applies to
/// this crate's target; an unparseable level falls back to `info` rather
/// than failing startup over a log knob.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("cdn_tunnel={level}")))
        .unwrap_or_else(|_| EnvFilter::new("cdn_tunnel=info"))
}

/// Initialize logging at the configured level.
///
/// # Panics
///
/// Panics if a subscriber is already installed; use [`try_init`] where
/// that can happen.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .compact()
        .init();
}

/// Fallible variant of [`init`] for tests, where many cases race to
/// install the process-wide subscriber. Returns whether this call won.
pub fn try_init(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .compact()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = try_init("info");
        // Whoever installed the subscriber, a second attempt in the same
        // process must fail.
        assert!(!try_init("info"));
    }

    #[test]
    fn test_invalid_level_does_not_panic() {
        let _ = filter("not a level!!");
    }

    #[test]
    fn test_emit_after_init() {
        let _ = try_init("debug");
        tracing::info!("logging smoke test");
        tracing::debug!("logging smoke test, debug");
    }
}
