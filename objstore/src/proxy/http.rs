//! REST client for the storage proxy.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode, Url};
use tracing::debug;

use super::{PartChecksum, ProxyError, ProxyResult, StorageProxy};
use crate::spec::TransferSpecification;
use crate::transport::BoxFuture;

/// Storage proxy reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStorageProxy {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStorageProxy {
    /// Creates a proxy client for `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ProxyError::Transport(format!("invalid proxy URL '{}': {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> ProxyResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProxyError::Transport(format!("invalid proxy URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| ProxyError::Transport("proxy URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn fetch_specification(
        &self,
        request: reqwest::RequestBuilder,
        object_id: &str,
    ) -> ProxyResult<TransferSpecification> {
        let response = check_status(request.send().await?, object_id).await?;
        let body = response.bytes().await?;
        TransferSpecification::from_json(&body).map_err(|e| ProxyError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response, object_id: &str) -> ProxyResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ProxyError::NotFound(object_id.to_string()));
    }

    let message = response.text().await.unwrap_or_default();
    Err(ProxyError::Status {
        status: status.as_u16(),
        message,
    })
}

impl StorageProxy for HttpStorageProxy {
    fn get_download_specification<'a>(
        &'a self,
        object_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move {
            let url = self.endpoint(&["download", object_id], &[])?;
            debug!(object_id, url = %url, "Requesting download specification");
            self.fetch_specification(self.client.get(url), object_id)
                .await
        })
    }

    fn get_upload_specification<'a>(
        &'a self,
        object_id: &'a str,
        file_size: u64,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move {
            let size = file_size.to_string();
            let url = self.endpoint(
                &["upload", object_id, "uploads"],
                &[("fileSize", size.as_str())],
            )?;
            debug!(object_id, file_size, "Requesting upload specification");
            self.fetch_specification(self.client.post(url), object_id)
                .await
        })
    }

    fn refresh_specification<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move {
            let url = self.endpoint(&["transfer", object_id, "sessions", session_id], &[])?;
            debug!(object_id, session_id, "Refreshing specification");
            self.fetch_specification(self.client.get(url), object_id)
                .await
        })
    }

    fn finalize_upload<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
        parts: &'a [PartChecksum],
    ) -> BoxFuture<'a, ProxyResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["upload", object_id], &[("uploadId", session_id)])?;
            let body =
                serde_json::to_vec(parts).map_err(|e| ProxyError::Decode(e.to_string()))?;
            debug!(object_id, session_id, parts = parts.len(), "Finalizing upload");

            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;
            check_status(response, object_id).await?;
            Ok(())
        })
    }

    fn abort_upload<'a>(
        &'a self,
        object_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["upload", object_id], &[("uploadId", session_id)])?;
            debug!(object_id, session_id, "Aborting upload");

            let response = self.client.delete(url).send().await?;
            check_status(response, object_id).await?;
            Ok(())
        })
    }
}
