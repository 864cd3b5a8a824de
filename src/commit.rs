//! Commit assembly and the top-level [`HubClient`].
//!
//! A commit is an ordered NDJSON log: a header operation, then one
//! operation per surviving file (inline content or an LFS pointer), then
//! deletions. Every transfer must succeed before the log is submitted, so
//! a failed upload never produces a partial commit.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::api::{ApiClient, Endpoints};
use crate::digest::DEFAULT_HASH_CHUNK_SIZE;
use crate::error::{CommitError, Result};
use crate::http::{ReqwestTransport, Transport};
use crate::progress::{ProgressAggregator, ProgressObserver};
use crate::upload::multipart::upload_multipart;
use crate::upload::negotiate::negotiate;
use crate::upload::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::upload::single::upload_single_part;
use crate::upload::task::{ContentSource, FileUploadTask, UploadStrategy};

/// One line of the commit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
pub enum CommitOperation {
    /// Commit metadata. Always the first line.
    Header {
        summary: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Small file carried base64-encoded inside the log itself.
    File {
        path: String,
        content: String,
        encoding: String,
    },
    /// Pointer to content already uploaded to the object store.
    LfsFile {
        path: String,
        oid: String,
        size: u64,
        algo: String,
    },
    Delete {
        path: String,
    },
}

impl CommitOperation {
    pub fn header(summary: impl Into<String>, description: Option<String>) -> Self {
        Self::Header {
            summary: summary.into(),
            description,
        }
    }

    pub fn inline_file(path: impl Into<String>, content: &[u8]) -> Self {
        Self::File {
            path: path.into(),
            content: BASE64.encode(content),
            encoding: "base64".to_string(),
        }
    }

    pub fn lfs_file(path: impl Into<String>, oid: impl Into<String>, size: u64) -> Self {
        Self::LfsFile {
            path: path.into(),
            oid: oid.into(),
            size,
            algo: "sha256".to_string(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }
}

/// A file staged for commit: where it lands in the repository and where
/// its bytes come from.
#[derive(Debug)]
pub struct CommitFile {
    pub path: String,
    pub source: ContentSource,
}

/// Everything one commit changes.
#[derive(Debug, Default)]
pub struct CommitRequest {
    pub summary: String,
    pub description: Option<String>,
    pub files: Vec<CommitFile>,
    pub deletes: Vec<String>,
}

/// Tuning knobs for the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Part PUTs in flight at once per multipart file.
    pub part_concurrency: usize,
    pub retry: RetryPolicy,
    /// Read granularity while digesting, bounding memory for large files.
    pub hash_chunk_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_concurrency: 4,
            retry: RetryPolicy::default(),
            hash_chunk_size: DEFAULT_HASH_CHUNK_SIZE,
        }
    }
}

/// Client committing files to one hub repository.
pub struct HubClient {
    api: ApiClient,
    transport: Arc<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    config: UploadConfig,
}

impl HubClient {
    pub fn new(endpoints: Endpoints, token: Option<String>) -> Self {
        Self::with_transport(
            Arc::new(ReqwestTransport::new()),
            Box::new(TokioSleeper),
            endpoints,
            token,
        )
    }

    /// Build a client over a custom transport and sleeper.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        sleeper: Box<dyn Sleeper>,
        endpoints: Endpoints,
        token: Option<String>,
    ) -> Self {
        Self {
            api: ApiClient::new(transport.clone(), endpoints, token),
            transport,
            sleeper,
            config: UploadConfig::default(),
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one commit end to end: digest, negotiate, transfer, submit.
    ///
    /// Files transfer sequentially in request order (parts within a
    /// multipart file run concurrently). Any failure aborts before the
    /// commit log is submitted, leaving the repository untouched.
    pub async fn commit(
        &self,
        request: CommitRequest,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> Result<()> {
        let aggregator = Arc::new(ProgressAggregator::new(observer));

        let mut tasks = Vec::with_capacity(request.files.len());
        for file in request.files {
            let size = file.source.size().await?;
            aggregator.register(&file.path, size);
            tasks.push(FileUploadTask::new(file.path, file.source, size));
        }

        // Every digest is computed before the first network call so the
        // preupload request describes the whole batch at once.
        for task in tasks.iter_mut() {
            task.compute_digest(self.config.hash_chunk_size).await?;
        }

        if !tasks.is_empty() {
            negotiate(&self.api, &mut tasks).await?;
        }

        let mut operations = vec![CommitOperation::header(request.summary, request.description)];

        for task in &tasks {
            let strategy = task.strategy.as_ref().ok_or_else(|| {
                CommitError::Custom(format!("no upload strategy for {}", task.path))
            })?;
            let oid = task.digest.as_deref().unwrap_or_default();
            let report: Arc<dyn Fn(f64) + Send + Sync> = {
                let aggregator = aggregator.clone();
                let path = task.path.clone();
                Arc::new(move |fraction| aggregator.update(&path, fraction))
            };
            match strategy {
                UploadStrategy::Skip => {
                    // Dedup hit: no transfer and no commit operation.
                    debug!(path = %task.path, "skipping deduplicated file");
                    aggregator.complete(&task.path);
                }
                UploadStrategy::Inline => {
                    let content = task.source.read_all(task.size).await?;
                    operations.push(CommitOperation::inline_file(&task.path, &content));
                    aggregator.complete(&task.path);
                }
                UploadStrategy::SinglePart(session) => {
                    upload_single_part(&self.transport, session, &task.source, oid, task.size, report)
                        .await?;
                    operations.push(CommitOperation::lfs_file(&task.path, oid, task.size));
                    aggregator.complete(&task.path);
                }
                UploadStrategy::Multipart(session) => {
                    upload_multipart(
                        &self.transport,
                        self.sleeper.as_ref(),
                        &self.config.retry,
                        self.config.part_concurrency,
                        session,
                        &task.source,
                        oid,
                        task.size,
                        report,
                    )
                    .await?;
                    operations.push(CommitOperation::lfs_file(&task.path, oid, task.size));
                    aggregator.complete(&task.path);
                }
            }
        }

        for path in &request.deletes {
            operations.push(CommitOperation::delete(path));
        }

        self.api.commit(&operations).await
    }
}
