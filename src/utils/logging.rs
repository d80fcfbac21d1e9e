//! Structured logging setup.
//!
//! Installs a `tracing` subscriber from [`LoggingConfig`]. Protocol events
//! (skipped envelopes, dropped dispatches, cache growth) are emitted with
//! structured fields throughout the crate; this just wires up the sink.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Fails if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.log_to_console {
        builder
            .try_init()
            .map_err(|e| ProtocolError::Config(format!("Failed to install subscriber: {e}")))
    } else {
        builder
            .with_writer(std::io::sink)
            .try_init()
            .map_err(|e| ProtocolError::Config(format!("Failed to install subscriber: {e}")))
    }
}
