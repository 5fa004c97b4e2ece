//! Transfer of a single part.
//!
//! A [`PartWorker`] moves one part between the local file and its signed URL
//! and reports a [`PartOutcome`]. Transient network errors are retried in
//! place according to the [`LocalRetryPolicy`]; everything else is handed
//! back to the engine, which owns the retry budget and URL refreshes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use super::client::{BoxFuture, PartClient, PartError};
use super::policy::LocalRetryPolicy;
use crate::checksum;
use crate::local::LocalFile;
use crate::spec::{ByteRange, Part};

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Remote object to local file.
    Download,
    /// Local file to remote object.
    Upload,
}

/// Why a part attempt did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureReason {
    #[error("signed URL expired")]
    ExpiredUrl,

    #[error("timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("range rejected: {0}")]
    RangeRejected(String),

    #[error("short body: expected {expected} bytes, received {actual}")]
    ShortBody { expected: u64, actual: u64 },

    #[error("local I/O error: {0}")]
    Io(String),

    /// The worker task itself failed.
    #[error("worker failed: {0}")]
    Internal(String),
}

impl FailureReason {
    /// True for failures worth retrying in place with the same URL.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::ShortBody { .. } => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }
}

impl From<PartError> for FailureReason {
    fn from(e: PartError) -> Self {
        match e {
            PartError::Timeout => Self::Timeout,
            PartError::Connection(msg) => Self::Network(msg),
            PartError::Expired => Self::ExpiredUrl,
            PartError::Status(code) => Self::Status(code),
            PartError::RangeRejected(msg) => Self::RangeRejected(msg),
        }
    }
}

/// Proof that a part was transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    pub part_number: u32,
    pub bytes: u64,
    /// MD5 of the bytes moved, or the backend ETag for uploads that got one.
    pub checksum: String,
    /// SHA-256 of the bytes written, for the resumption journal. Downloads only.
    pub sha256: Option<String>,
}

/// Result of one worker run for one part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartOutcome {
    Success(PartReceipt),
    Retryable(FailureReason),
    Fatal(FailureReason),
}

/// Moves single parts between a [`LocalFile`] and signed URLs.
#[derive(Clone)]
pub struct PartWorker {
    client: Arc<dyn PartClient>,
    file: LocalFile,
    retry: LocalRetryPolicy,
    timeout: Duration,
}

impl PartWorker {
    pub fn new(
        client: Arc<dyn PartClient>,
        file: LocalFile,
        retry: LocalRetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            file,
            retry,
            timeout,
        }
    }

    /// Transfers `part` in the given direction.
    pub async fn run(&self, direction: TransferDirection, part: &Part) -> PartOutcome {
        match direction {
            TransferDirection::Download => self.download(part).await,
            TransferDirection::Upload => self.upload(part).await,
        }
    }

    /// Fetches `part` and writes it at its offset.
    pub async fn download(&self, part: &Part) -> PartOutcome {
        let range = match part.range() {
            Ok(range) => range,
            Err(e) => return PartOutcome::Fatal(FailureReason::RangeRejected(e.to_string())),
        };

        let body = match self
            .with_local_retry(part.part_number, || self.fetch(part, range))
            .await
        {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let md5 = match &part.checksum {
            Some(expected) => match checksum::verify_md5(expected, &body) {
                Ok(actual) => actual,
                Err((expected, actual)) => {
                    warn!(part_number = part.part_number, %expected, %actual, "Part checksum mismatch");
                    return PartOutcome::Retryable(FailureReason::ChecksumMismatch {
                        expected,
                        actual,
                    });
                }
            },
            None => checksum::md5_hex(&body),
        };
        let sha256 = checksum::sha256_hex(&body);

        if let Err(e) = self.file.write_at(part.offset, body).await {
            return PartOutcome::Fatal(FailureReason::Io(format!(
                "write of part {} to {} failed: {}",
                part.part_number,
                self.file.path().display(),
                e
            )));
        }

        debug!(part_number = part.part_number, bytes = part.part_size, "Part downloaded");
        PartOutcome::Success(PartReceipt {
            part_number: part.part_number,
            bytes: part.part_size,
            checksum: md5,
            sha256: Some(sha256),
        })
    }

    /// Reads `part` from the file and uploads it.
    pub async fn upload(&self, part: &Part) -> PartOutcome {
        let body = match self.file.read_at(part.offset, part.part_size).await {
            Ok(body) => body,
            Err(e) => {
                return PartOutcome::Fatal(FailureReason::Io(format!(
                    "read of part {} from {} failed: {}",
                    part.part_number,
                    self.file.path().display(),
                    e
                )))
            }
        };
        let local_md5 = checksum::md5_hex(&body);

        let etag = match self
            .with_local_retry(part.part_number, || {
                self.attempt(self.client.put_part(&part.url, body.clone()))
            })
            .await
        {
            Ok(etag) => etag,
            Err(outcome) => return outcome,
        };

        let receipt_checksum = match etag.as_deref() {
            Some(raw) => {
                if let Some(remote) = checksum::normalize_etag(raw) {
                    if remote != local_md5 {
                        warn!(
                            part_number = part.part_number,
                            expected = %local_md5,
                            actual = %remote,
                            "Backend ETag does not match uploaded bytes"
                        );
                        return PartOutcome::Retryable(FailureReason::ChecksumMismatch {
                            expected: local_md5,
                            actual: remote,
                        });
                    }
                }
                raw.trim().trim_matches('"').to_string()
            }
            None => local_md5,
        };

        debug!(part_number = part.part_number, bytes = part.part_size, "Part uploaded");
        PartOutcome::Success(PartReceipt {
            part_number: part.part_number,
            bytes: part.part_size,
            checksum: receipt_checksum,
            sha256: None,
        })
    }

    async fn fetch(&self, part: &Part, range: ByteRange) -> Result<Bytes, FailureReason> {
        let body = self
            .attempt(self.client.get_range(&part.url, range))
            .await?;

        let actual = body.len() as u64;
        if actual < part.part_size {
            return Err(FailureReason::ShortBody {
                expected: part.part_size,
                actual,
            });
        }
        if actual > part.part_size {
            return Err(FailureReason::RangeRejected(format!(
                "{} returned {} bytes, expected {}",
                range, actual, part.part_size
            )));
        }
        Ok(body)
    }

    /// Runs one request under the per-attempt timeout.
    async fn attempt<T>(
        &self,
        request: BoxFuture<'_, Result<T, PartError>>,
    ) -> Result<T, FailureReason> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(FailureReason::from),
            Err(_) => Err(FailureReason::Timeout),
        }
    }

    /// Repeats `op` while it fails transiently and the policy allows.
    async fn with_local_retry<T, F, Fut>(&self, part_number: u32, mut op: F) -> Result<T, PartOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FailureReason>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match op().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if !failure.is_transient() {
                return Err(match failure {
                    FailureReason::ExpiredUrl => PartOutcome::Retryable(failure),
                    other => PartOutcome::Fatal(other),
                });
            }

            match self.retry.delay_for_attempt(attempt) {
                Some(delay) => {
                    debug!(
                        part_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Retrying part locally"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(PartOutcome::Retryable(failure)),
            }
        }
    }
}
