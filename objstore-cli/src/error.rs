//! CLI error type.

use thiserror::Error;

use objstore::logging::LoggingError;
use objstore::{ConfigError, ProxyError, TransportError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("storage proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Transfer(#[from] TransportError),
}

impl CliError {
    /// True when the user interrupted the transfer.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CliError::Transfer(e) if e.abort_reason() == Some(&objstore::AbortReason::Cancelled)
        )
    }
}
