//! Hub API client for upload negotiation and commit submission.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::api::types::{
    BatchObject, LfsBatchRequest, LfsBatchResponse, LfsObjectRef, PreuploadFile, PreuploadRequest,
    PreuploadResponse, PreuploadResult,
};
use crate::commit::CommitOperation;
use crate::error::{CommitError, Result};
use crate::http::Transport;

/// Timeout for negotiation and commit calls. Raw content PUTs are not
/// bounded; these small JSON exchanges are.
pub(crate) const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoint URLs for one target repository.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Batch preupload endpoint deciding inline-vs-LFS and dedup per file.
    pub preupload_url: String,
    /// Git-LFS batch endpoint issuing presigned upload actions.
    pub lfs_batch_url: String,
    /// Commit endpoint accepting the NDJSON operation log.
    pub commit_url: String,
}

/// Client for the hub's negotiation and commit endpoints.
///
/// Presigned object-storage URLs returned by negotiation are NOT called
/// through this client: they carry their own authorization and must not
/// receive the API bearer token.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, token: Option<String>) -> Self {
        Self {
            transport,
            endpoints,
            token,
        }
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => vec![("Authorization".to_string(), format!("Bearer {token}"))],
            None => Vec::new(),
        }
    }

    async fn post_body(&self, url: &str, content_type: &str, body: String) -> Result<String> {
        let headers = self.auth_headers();
        let response = timeout(
            API_TIMEOUT,
            self.transport.post(url, &headers, content_type, body),
        )
        .await
        .map_err(|_| CommitError::Custom(format!("request to {url} timed out")))??
        .error_for_status()?;
        Ok(response.body)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, payload: &impl Serialize) -> Result<T> {
        let body = self
            .post_body(url, "application/json", serde_json::to_string(payload)?)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Ask the server which files it already holds and which upload mode
    /// each remaining file should use.
    pub async fn preupload(&self, files: Vec<PreuploadFile>) -> Result<Vec<PreuploadResult>> {
        debug!(files = files.len(), "preupload negotiation");
        let response: PreuploadResponse = self
            .post_json(&self.endpoints.preupload_url, &PreuploadRequest { files })
            .await?;
        Ok(response.files)
    }

    /// Request upload actions for a batch of LFS objects.
    pub async fn lfs_batch(&self, objects: Vec<LfsObjectRef>) -> Result<Vec<BatchObject>> {
        debug!(objects = objects.len(), "LFS batch negotiation");
        let response: LfsBatchResponse = self
            .post_json(&self.endpoints.lfs_batch_url, &LfsBatchRequest::upload(objects))
            .await?;
        Ok(response.objects)
    }

    /// Submit the assembled operation log as one atomic commit.
    ///
    /// The body is newline-delimited JSON, one operation per line, with the
    /// header operation first.
    pub async fn commit(&self, operations: &[CommitOperation]) -> Result<()> {
        debug!(operations = operations.len(), "submitting commit");
        let mut body = String::new();
        for operation in operations {
            body.push_str(&serde_json::to_string(operation)?);
            body.push('\n');
        }
        self.post_body(&self.endpoints.commit_url, "application/x-ndjson", body)
            .await?;
        Ok(())
    }
}
