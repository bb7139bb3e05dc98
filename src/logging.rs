//! Diagnostic logging setup.
//!
//! Logs go to stderr so stdout stays usable for machine-readable output.

use crate::error::{Result, VoxstateError};
use tracing_subscriber::EnvFilter;

/// Default filter directive for the given command line flags.
///
/// `-q` only shows errors; each `-v` raises the level by one step.
pub fn level_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the flags.
///
/// # Errors
/// Fails if a global subscriber was already installed.
pub fn init(verbosity: u8, quiet: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .try_init()
        .map_err(|e| VoxstateError::Other(format!("Failed to initialise logging: {}", e)))
}
