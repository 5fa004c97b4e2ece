//! Object download orchestration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{check_object_id, TransferContext};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::journal::PartJournal;
use crate::progress::TransferProgress;
use crate::proxy::StorageProxy;
use crate::transport::{PartClient, TransferReport};

/// Downloads whole objects into a directory, resuming interrupted runs.
#[derive(Clone)]
pub struct ObjectDownloader {
    ctx: TransferContext,
}

impl ObjectDownloader {
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

    /// Progress handle updated during the download.
    pub fn with_progress(mut self, progress: TransferProgress) -> Self {
        self.ctx.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.ctx.cancel = cancel;
        self
    }

    /// Where `object_id` is written inside `output_dir`.
    pub fn destination(output_dir: &Path, object_id: &str) -> PathBuf {
        output_dir.join(object_id)
    }

    /// Downloads `object_id` to `<output_dir>/<object_id>`.
    ///
    /// Progress of each completed part is journaled next to the file, so an
    /// aborted download continues where it stopped when run again.
    pub async fn download(
        &self,
        object_id: &str,
        output_dir: &Path,
    ) -> TransportResult<TransferReport> {
        check_object_id(object_id)?;
        fs::create_dir_all(output_dir).map_err(|e| TransportError::io(output_dir, e))?;

        let destination = Self::destination(output_dir, object_id);
        let journal_path = PartJournal::path_for(output_dir, object_id);

        let spec = self.ctx.proxy.get_download_specification(object_id).await?;
        info!(
            object_id,
            parts = spec.len(),
            size = spec.total_size(),
            destination = %destination.display(),
            "Downloading object"
        );

        let journal = PartJournal::open(&journal_path, object_id)?;
        let engine = self
            .ctx
            .builder()
            .specification(spec)
            .journal(journal)
            .build()?;

        let report = engine.receive(&destination).await?;

        if let Err(e) = PartJournal::discard(&journal_path) {
            warn!(path = %journal_path.display(), error = %e, "Failed to remove part journal");
        }
        Ok(report)
    }
}
