//! Validated assembly of a [`TransportEngine`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::client::{PartClient, ReqwestPartClient};
use super::engine::TransportEngine;
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::journal::PartJournal;
use crate::progress::TransferProgress;
use crate::proxy::StorageProxy;
use crate::spec::{Part, TransferSpecification};

/// Builder for [`TransportEngine`].
///
/// `proxy`, `progress`, `parts`, `object_id` and `session_id` are required;
/// [`specification`](Self::specification) sets the last three at once.
///
/// # Example
///
/// ```ignore
/// let engine = TransportBuilder::new()
///     .proxy(proxy)
///     .progress(TransferProgress::default())
///     .specification(spec)
///     .config(TransportConfig::default().with_concurrency(4))
///     .build()?;
/// let report = engine.receive(&path).await?;
/// ```
#[derive(Default)]
pub struct TransportBuilder {
    proxy: Option<Arc<dyn StorageProxy>>,
    progress: Option<TransferProgress>,
    parts: Option<Vec<Part>>,
    object_id: Option<String>,
    session_id: Option<String>,
    client: Option<Arc<dyn PartClient>>,
    config: TransportConfig,
    cancel: Option<CancellationToken>,
    journal: Option<PartJournal>,
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Proxy used to refresh expired URLs.
    pub fn proxy(mut self, proxy: Arc<dyn StorageProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Progress handle the engine updates.
    pub fn progress(mut self, progress: TransferProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn parts(mut self, parts: Vec<Part>) -> Self {
        self.parts = Some(parts);
        self
    }

    pub fn object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets parts, object id and session id from an issued specification.
    pub fn specification(self, spec: TransferSpecification) -> Self {
        self.object_id(spec.object_id)
            .session_id(spec.session_id)
            .parts(spec.parts)
    }

    /// HTTP client for part requests. Defaults to [`ReqwestPartClient`].
    pub fn client(mut self, client: Arc<dyn PartClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Token that cancels the transfer. A fresh token is used otherwise.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Journal for download resumption.
    pub fn journal(mut self, journal: PartJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// [`TransportError::IncompleteConfiguration`] naming the first missing
    /// required field, or [`TransportError::Client`] if the default HTTP
    /// client cannot be created. The specification itself is validated when
    /// the transfer starts.
    pub fn build(self) -> TransportResult<TransportEngine> {
        let proxy = self
            .proxy
            .ok_or(TransportError::IncompleteConfiguration("proxy"))?;
        let progress = self
            .progress
            .ok_or(TransportError::IncompleteConfiguration("progress"))?;
        let parts = self
            .parts
            .ok_or(TransportError::IncompleteConfiguration("parts"))?;
        let object_id = self
            .object_id
            .ok_or(TransportError::IncompleteConfiguration("object_id"))?;
        let session_id = self
            .session_id
            .ok_or(TransportError::IncompleteConfiguration("session_id"))?;

        let client: Arc<dyn PartClient> = match self.client {
            Some(client) => client,
            None => Arc::new(ReqwestPartClient::new(self.config.part_timeout)?),
        };

        Ok(TransportEngine::new(
            proxy,
            client,
            progress,
            TransferSpecification::new(object_id, session_id, parts),
            self.config,
            self.cancel.unwrap_or_default(),
            self.journal,
        ))
    }
}
