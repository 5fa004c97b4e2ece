//! Control-plane access to the storage proxy.
//!
//! The proxy issues [`TransferSpecification`]s (signed part URLs), refreshes
//! them when URLs expire, and finalizes or aborts multipart uploads. The
//! engine only depends on the [`StorageProxy`] trait; [`HttpStorageProxy`]
//! is the REST implementation.

mod http;

pub use http::HttpStorageProxy;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::TransferSpecification;
use crate::transport::BoxFuture;

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors from the storage proxy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The request never got a response.
    #[error("proxy request failed: {0}")]
    Transport(String),

    /// The proxy answered with an error status.
    #[error("proxy returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("invalid proxy response: {0}")]
    Decode(String),

    /// The object is unknown to the proxy.
    #[error("object not found: {0}")]
    NotFound(String),
}

impl ProxyError {
    /// True if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Checksum reported for one uploaded part, sent on finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartChecksum {
    pub part_number: u32,
    pub checksum: String,
}

/// Issues and manages transfer specifications.
pub trait StorageProxy: Send + Sync {
    /// Plan for downloading `object_id`.
    fn get_download_specification<'a>(
        &'a self,
        object_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>>;

    /// Plan for uploading `file_size` bytes as `object_id`. Opens a backend
    /// multipart session.
    fn get_upload_specification<'a>(
        &'a self,
        object_id: &'a str,
        file_size: u64,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>>;

    /// Same plan as `session_id`, with freshly signed URLs.
    fn refresh_specification<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>>;

    /// Completes a multipart upload.
    fn finalize_upload<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
        parts: &'a [PartChecksum],
    ) -> BoxFuture<'a, ProxyResult<()>>;

    /// Discards a multipart upload and its stored parts.
    fn abort_upload<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProxyError::Transport("reset".into()).is_retryable());
        assert!(ProxyError::Status {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(ProxyError::Status {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!ProxyError::Status {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!ProxyError::NotFound("obj".into()).is_retryable());
        assert!(!ProxyError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn test_part_checksum_json() {
        let parts = vec![PartChecksum {
            part_number: 1,
            checksum: "abc".to_string(),
        }];
        let json = serde_json::to_string(&parts).unwrap();
        assert_eq!(json, r#"[{"partNumber":1,"checksum":"abc"}]"#);
    }
}
