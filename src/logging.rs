//! Logging initialization built on `tracing`.
//!
//! The hosting application calls [`init_logging`] once at startup; the crate
//! itself only emits `tracing` events and never installs a subscriber on its
//! own.

use crate::error::Result;
use std::io::IsTerminal;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `verbose` lowers the default filter to `debug`, `quiet` raises it to
/// `error`; `RUST_LOG` always wins when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spool={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .map_err(|e| crate::error::SpoolError::Config(format!("logging init failed: {e}")))?;

    Ok(())
}

static TEST_INIT: Once = Once::new();

/// Install a test subscriber once per process. Safe to call from every test.
pub fn init_test_logging() {
    TEST_INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spool=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_test_writer()
            .try_init();
    });
}
