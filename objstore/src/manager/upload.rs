//! Object upload orchestration.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{check_object_id, TransferContext};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::progress::TransferProgress;
use crate::proxy::StorageProxy;
use crate::transport::{PartClient, TransferReport, TransportEngine};

/// Uploads local files as multipart objects.
///
/// A successful transfer is finalized on the backend. Any failure aborts
/// the backend session so no orphaned parts remain.
#[derive(Clone)]
pub struct ObjectUploader {
    ctx: TransferContext,
}

impl ObjectUploader {
    pub fn new(proxy: Arc<dyn StorageProxy>) -> Self {
        Self {
            ctx: TransferContext::new(proxy),
        }
    }

    /// Use a specific part client instead of the default reqwest one.
    pub fn with_client(mut self, client: Arc<dyn PartClient>) -> Self {
        self.ctx.client = Some(client);
        self
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.ctx.config = config;
        self
    }

    /// Progress handle updated during the upload.
    pub fn with_progress(mut self, progress: TransferProgress) -> Self {
        self.ctx.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.ctx.cancel = cancel;
        self
    }

    /// Uploads `path` as `object_id`.
    pub async fn upload(&self, object_id: &str, path: &Path) -> TransportResult<TransferReport> {
        check_object_id(object_id)?;
        let size = fs::metadata(path)
            .map_err(|e| TransportError::io(path, e))?
            .len();

        let spec = self
            .ctx
            .proxy
            .get_upload_specification(object_id, size)
            .await?;
        let session_id = spec.session_id.clone();
        info!(
            object_id,
            session_id = %session_id,
            parts = spec.len(),
            size,
            "Uploading object"
        );

        let result = match self.ctx.builder().specification(spec).build() {
            Ok(engine) => self.send_and_finalize(&engine, object_id, path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(object_id, session_id = %session_id, error = %e, "Upload failed, aborting session");
            if let Err(abort_err) = self.ctx.proxy.abort_upload(object_id, &session_id).await {
                warn!(
                    object_id,
                    session_id = %session_id,
                    error = %abort_err,
                    "Failed to abort upload session"
                );
            }
        }
        result
    }

    async fn send_and_finalize(
        &self,
        engine: &TransportEngine,
        object_id: &str,
        path: &Path,
    ) -> TransportResult<TransferReport> {
        let report = engine.send(path).await?;
        self.ctx
            .proxy
            .finalize_upload(object_id, &report.session_id, &report.part_checksums)
            .await?;

        info!(
            object_id,
            parts = report.parts_transferred,
            bytes = report.bytes_transferred,
            "Upload finalized"
        );
        Ok(report)
    }
}
