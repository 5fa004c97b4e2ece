//! HTTP exchange for a single part.
//!
//! The [`PartClient`] trait abstracts the two requests a worker makes against
//! a signed URL, a ranged GET and a PUT, so tests can substitute in-memory
//! stores for the real backend.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ETAG, RANGE};
use reqwest::StatusCode;
use thiserror::Error;

use crate::error::{TransportError, TransportResult};
use crate::spec::ByteRange;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from one HTTP exchange against a part URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartError {
    /// The request did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// The connection failed or was reset.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The signed URL expired or its signature was rejected (HTTP 403).
    #[error("signed URL expired or rejected")]
    Expired,

    /// The backend answered with an unexpected status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The backend did not honour the exact byte range.
    #[error("range not honoured: {0}")]
    RangeRejected(String),
}

impl PartError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => Self::Expired,
            416 => Self::RangeRejected("416 Range Not Satisfiable".to_string()),
            code => Self::Status(code),
        }
    }

    /// True for errors worth retrying with the same URL.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            Self::Expired | Self::RangeRejected(_) => false,
        }
    }
}

impl From<reqwest::Error> for PartError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Performs the network side of a part transfer.
pub trait PartClient: Send + Sync {
    /// Fetches `range` from `url`.
    fn get_range<'a>(&'a self, url: &'a str, range: ByteRange)
        -> BoxFuture<'a, Result<Bytes, PartError>>;

    /// Uploads `body` to `url`, returning the backend's ETag if it sent one.
    fn put_part<'a>(
        &'a self,
        url: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<Option<String>, PartError>>;
}

/// Real part client using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestPartClient {
    client: reqwest::Client,
}

impl ReqwestPartClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl PartClient for ReqwestPartClient {
    fn get_range<'a>(
        &'a self,
        url: &'a str,
        range: ByteRange,
    ) -> BoxFuture<'a, Result<Bytes, PartError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .header(RANGE, range.to_string())
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::OK {
                // The backend ignored the Range header. That is only usable
                // when the whole object is exactly this range.
                if range.start != 0 || response.content_length() != Some(range.len()) {
                    return Err(PartError::RangeRejected(format!(
                        "expected 206 for {}, got 200 with {:?} bytes",
                        range,
                        response.content_length()
                    )));
                }
            } else if status != StatusCode::PARTIAL_CONTENT {
                return Err(PartError::from_status(status.as_u16()));
            }

            Ok(response.bytes().await?)
        })
    }

    fn put_part<'a>(
        &'a self,
        url: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<Option<String>, PartError>> {
        Box::pin(async move {
            let response = self.client.put(url).body(body).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(PartError::from_status(status.as_u16()));
            }

            Ok(response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string))
        })
    }
}
