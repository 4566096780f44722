//! Tracing initialisation for tests.
//!
//! ```ignore
//! #[test]
//! fn test_example() {
//!     remedy_common::testing::init_test_logging();
//!     tracing::info!(machine = "mlab1-abc01", "captured by the test writer");
//! }
//! ```

use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

static TEST_LOGGING_INIT: Once = Once::new();

/// Install a compact subscriber writing through the libtest capture.
///
/// Safe to call from every test; only the first call installs anything.
/// `REMEDY_TEST_LOG_LEVEL` sets the level for the Remedy crates (default
/// `debug`); `RUST_LOG` overrides the whole filter when set.
pub fn init_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level =
                std::env::var("REMEDY_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
            EnvFilter::try_new(format!("remedy_common={level},remedyd={level}"))
                .unwrap_or_else(|_| EnvFilter::new("info"))
        });

        let layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_level(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialised twice without panicking");
    }
}
