//! Error types for the transport layer.
//!
//! Per-part failures never escape the engine. Callers only ever see a
//! [`TransportError`]: either a configuration problem detected before any
//! network I/O, or a single aggregated [`TransportError::Aborted`] describing
//! the dominant cause of a failed transfer.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::proxy::ProxyError;
use crate::transport::FailureReason;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while preparing or running a transfer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A required builder field was never set.
    #[error("incomplete transport configuration: missing {0}")]
    IncompleteConfiguration(&'static str),

    /// The object id cannot name a local file.
    #[error("invalid object id: '{0}'")]
    InvalidObjectId(String),

    /// The specification contains no parts.
    #[error("transfer specification has no parts")]
    EmptySpecification,

    /// The parts leave a gap or overlap somewhere in the object.
    #[error(
        "parts are not contiguous at part {part_number}: expected offset {expected_offset}, found {actual_offset}"
    )]
    NonContiguousParts {
        part_number: u32,
        expected_offset: u64,
        actual_offset: u64,
    },

    /// A part cannot be turned into a valid byte range.
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    /// The local file does not match the specification's total size.
    #[error("size mismatch: specification declares {expected} bytes, local file has {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// `send`/`receive` was invoked on an engine that already ran.
    #[error("transfer already started")]
    AlreadyStarted,

    /// Local file I/O failed before the transfer began.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The control-plane proxy failed.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// The HTTP client for part transfers could not be created.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The resumption journal could not be read or written.
    #[error("journal error: {0}")]
    Journal(String),

    /// The transfer ran but did not complete.
    #[error("transfer aborted: {reason} ({incomplete_parts} part(s) incomplete)")]
    Aborted {
        reason: AbortReason,
        failed_parts: Vec<u32>,
        incomplete_parts: usize,
    },
}

impl TransportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the abort reason if this is an aborted transfer.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Self::Aborted { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Returns true if the error was detected before any network activity.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::IncompleteConfiguration(_)
                | Self::InvalidObjectId(_)
                | Self::EmptySpecification
                | Self::NonContiguousParts { .. }
                | Self::InvalidPart { .. }
                | Self::SizeMismatch { .. }
        )
    }
}

/// Why a running transfer ended in the `Aborted` state.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// A part failed in a way retrying cannot fix.
    Fatal {
        part_number: u32,
        reason: FailureReason,
    },
    /// The transfer-wide retry budget ran out.
    RetryBudgetExhausted { retries: u64 },
    /// The caller cancelled the transfer.
    Cancelled,
    /// The proxy could not supply a fresh specification.
    ProxyUnavailable(String),
    /// A refreshed specification no longer describes the same object layout.
    SpecificationChanged(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal {
                part_number,
                reason,
            } => write!(f, "part {} failed: {}", part_number, reason),
            Self::RetryBudgetExhausted { retries } => {
                write!(f, "retry budget exhausted after {} retries", retries)
            }
            Self::Cancelled => write!(f, "cancelled"),
            Self::ProxyUnavailable(msg) => write!(f, "proxy unavailable: {}", msg),
            Self::SpecificationChanged(msg) => {
                write!(f, "refreshed specification changed: {}", msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_display_includes_reason_and_count() {
        let err = TransportError::Aborted {
            reason: AbortReason::Fatal {
                part_number: 3,
                reason: FailureReason::Status(404),
            },
            failed_parts: vec![3],
            incomplete_parts: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("part 3 failed"));
        assert!(msg.contains("2 part(s) incomplete"));
    }

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(TransportError::EmptySpecification.is_configuration_error());
        assert!(TransportError::SizeMismatch {
            expected: 10,
            actual: 9
        }
        .is_configuration_error());
        assert!(!TransportError::AlreadyStarted.is_configuration_error());
    }

    #[test]
    fn test_abort_reason_accessor() {
        let err = TransportError::Aborted {
            reason: AbortReason::Cancelled,
            failed_parts: vec![],
            incomplete_parts: 1,
        };
        assert_eq!(err.abort_reason(), Some(&AbortReason::Cancelled));
        assert!(TransportError::EmptySpecification.abort_reason().is_none());
    }
}
