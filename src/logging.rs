//! Test logging
//!
//! Installs a `tracing` subscriber that writes through the test harness's
//! output capture.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `suitekit=debug`
pub const LOG_ENV: &str = "SUITEKIT_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Install the test subscriber; later calls keep the first one
///
/// Returns `true` if this call installed it.
pub fn init_test_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init()
        .is_ok()
}
