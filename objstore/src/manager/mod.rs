//! High-level object transfers.
//!
//! The orchestrators tie the proxy and the engine together:
//!
//! ```text
//! ObjectDownloader                      ObjectUploader
//!   │ get_download_specification          │ get_upload_specification(size)
//!   │ PartJournal (resume)                │ TransportEngine::send
//!   │ TransportEngine::receive            │ finalize_upload / abort_upload
//!   └ remove journal                      └
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use objstore::manager::ObjectDownloader;
//! use objstore::proxy::HttpStorageProxy;
//!
//! let proxy = Arc::new(HttpStorageProxy::new("https://proxy.example.org", timeout)?);
//! let report = ObjectDownloader::new(proxy)
//!     .download("a82efa12", Path::new("/data"))
//!     .await?;
//! ```

mod download;
mod upload;

pub use download::ObjectDownloader;
pub use upload::ObjectUploader;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::progress::TransferProgress;
use crate::proxy::StorageProxy;
use crate::transport::{PartClient, TransportBuilder};

/// Settings shared by both orchestrators.
#[derive(Clone)]
struct TransferContext {
    proxy: Arc<dyn StorageProxy>,
    client: Option<Arc<dyn PartClient>>,
    config: TransportConfig,
    progress: TransferProgress,
    cancel: CancellationToken,
}

impl TransferContext {
    fn new(proxy: Arc<dyn StorageProxy>) -> Self {
        Self {
            proxy,
            client: None,
            config: TransportConfig::default(),
            progress: TransferProgress::default(),
            cancel: CancellationToken::new(),
        }
    }

    fn builder(&self) -> TransportBuilder {
        let builder = TransportBuilder::new()
            .proxy(Arc::clone(&self.proxy))
            .progress(self.progress.clone())
            .config(self.config.clone())
            .cancellation(self.cancel.clone());

        match &self.client {
            Some(client) => builder.client(Arc::clone(client)),
            None => builder,
        }
    }
}

/// Rejects ids that cannot safely be used as a file name.
fn check_object_id(object_id: &str) -> TransportResult<()> {
    let valid = !object_id.is_empty()
        && object_id != "."
        && object_id != ".."
        && !object_id.contains(['/', '\\']);

    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidObjectId(object_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_object_id() {
        assert!(check_object_id("a82efa12-9c3e-5b1a-9d4f-3c7e2a1b0f99").is_ok());
        assert!(check_object_id("").is_err());
        assert!(check_object_id("..").is_err());
        assert!(check_object_id("../etc/passwd").is_err());
        assert!(check_object_id("a\\b").is_err());
    }
}
