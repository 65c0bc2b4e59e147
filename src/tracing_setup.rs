//! Tracing setup for the ledger binary.
//!
//! `RUST_LOG` takes precedence over the configured level. Logs go to stderr
//! so command output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn init_tracing(config: &LoggingConfig) -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .try_init()
    }
}
