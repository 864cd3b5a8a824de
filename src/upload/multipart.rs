//! Multipart transfer to per-part presigned URLs.
//!
//! The file is sliced into `chunk_size` parts which are PUT through a
//! bounded worker pool with per-part retry. Once every part has an ETag,
//! a completion call finalizes the object; completion is never issued for
//! a partially uploaded file.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use std::sync::{Arc, Mutex};
use tokio::time::timeout;
use tracing::debug;

use crate::api::client::API_TIMEOUT;
use crate::api::types::{CompletionPayload, PartResult};
use crate::error::{CommitError, Result};
use crate::http::{ProgressFn, Transport};
use crate::upload::negotiate::MultipartSession;
use crate::upload::retry::{AttemptOutcome, RetryPolicy, Sleeper, run_with_retry};
use crate::upload::task::ContentSource;
use crate::upload::verify_object;

/// Object-storage ceiling on parts per upload. Enforced client-side at
/// negotiation rather than trusting chunk-size negotiation alone.
pub const MAX_PARTS: u64 = 10_000;

/// One contiguous slice of the file, 1-indexed. The byte range is
/// half-open; the bytes themselves are read only when the part uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PartSpec {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

/// Slice `size` bytes into contiguous parts of `chunk_size`; the last
/// part holds the remainder (1 ≤ remainder ≤ chunk_size).
pub(crate) fn slice_parts(size: u64, chunk_size: u64) -> Vec<PartSpec> {
    let mut parts = Vec::new();
    let mut start = 0u64;
    while start < size {
        let end = (start + chunk_size).min(size);
        parts.push(PartSpec {
            part_number: parts.len() as u32 + 1,
            start,
            end,
        });
        start = end;
    }
    parts
}

/// Tracks bytes sent per part and reports the byte-weighted file fraction.
/// A retried part's counter resets so aborted bytes are not double-counted.
struct ProgressLedger {
    sent: Mutex<Vec<u64>>,
    size: u64,
    report: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressLedger {
    fn new(parts: usize, size: u64, report: Arc<dyn Fn(f64) + Send + Sync>) -> Self {
        Self {
            sent: Mutex::new(vec![0; parts]),
            size,
            report,
        }
    }

    fn add(&self, index: usize, bytes: u64) {
        let total = {
            let mut sent = self.sent.lock().unwrap();
            sent[index] += bytes;
            sent.iter().sum::<u64>()
        };
        (self.report)(total as f64 / self.size.max(1) as f64);
    }

    fn reset(&self, index: usize) {
        let total = {
            let mut sent = self.sent.lock().unwrap();
            sent[index] = 0;
            sent.iter().sum::<u64>()
        };
        (self.report)(total as f64 / self.size.max(1) as f64);
    }
}

fn strip_etag_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Upload one file through its multipart session.
///
/// At most `concurrency` part PUTs are in flight at a time. A part that
/// exhausts its retries fails the whole file and completion is never
/// called; the orphaned session is left to server-side garbage collection
/// (the wire contract exposes no abort endpoint).
pub(crate) async fn upload_multipart(
    transport: &Arc<dyn Transport>,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    concurrency: usize,
    session: &MultipartSession,
    source: &ContentSource,
    oid: &str,
    size: u64,
    report: Arc<dyn Fn(f64) + Send + Sync>,
) -> Result<()> {
    let parts = slice_parts(size, session.chunk_size);
    if parts.len() != session.part_urls.len() {
        return Err(CommitError::InvalidResponse(format!(
            "negotiated {} part URLs for {} parts",
            session.part_urls.len(),
            parts.len()
        )));
    }

    debug!(
        oid,
        size,
        parts = parts.len(),
        chunk_size = session.chunk_size,
        upload_id = %session.upload_id,
        "starting multipart upload"
    );

    let ledger = Arc::new(ProgressLedger::new(parts.len(), size, report));

    let mut uploads = stream::iter(parts.iter().enumerate().map(|(index, &part)| {
        let url = session.part_urls[index].clone();
        let transport = transport.clone();
        let ledger = ledger.clone();
        async move {
            run_with_retry(policy, sleeper, part.part_number, move |attempt| {
                let url = url.clone();
                let transport = transport.clone();
                let ledger = ledger.clone();
                async move {
                    if attempt > 1 {
                        ledger.reset(index);
                    }
                    let body: Bytes = match source.read_range(part.start, part.end).await {
                        Ok(body) => body,
                        Err(e) => return AttemptOutcome::Fatal(format!("read failed: {e}")),
                    };
                    let hook: ProgressFn = {
                        let ledger = ledger.clone();
                        Arc::new(move |bytes| ledger.add(index, bytes))
                    };
                    // No extra headers on part PUTs: they would trigger a
                    // CORS preflight that invalidates the signature.
                    match transport.put(&url, &[], body, Some(hook)).await {
                        Err(e) => AttemptOutcome::Transient(e.to_string()),
                        Ok(response) if response.status == 403 || response.status == 404 => {
                            AttemptOutcome::Fatal(format!("HTTP {}", response.status))
                        }
                        Ok(response) if !response.is_success() => {
                            AttemptOutcome::Transient(format!("HTTP {}", response.status))
                        }
                        Ok(response) => match response.etag {
                            Some(etag) => AttemptOutcome::Success(PartResult {
                                part_number: part.part_number,
                                etag: strip_etag_quotes(&etag),
                            }),
                            None => {
                                AttemptOutcome::Fatal("response missing ETag header".to_string())
                            }
                        },
                    }
                }
            })
            .await
        }
    }))
    .buffer_unordered(concurrency.max(1));

    let mut results: Vec<PartResult> = Vec::with_capacity(session.part_urls.len());
    while let Some(result) = uploads.next().await {
        results.push(result?);
    }
    drop(uploads);

    // Parts may finish in any order; the completion contract wants them
    // ascending by part number.
    results.sort_by_key(|part| part.part_number);

    let payload = CompletionPayload {
        oid: oid.to_string(),
        size,
        parts: results,
    };
    let completion_error = |reason: String| CommitError::Completion {
        oid: oid.to_string(),
        reason,
    };
    let response = timeout(
        API_TIMEOUT,
        transport.post(
            &session.completion_url,
            &[],
            "application/json",
            serde_json::to_string(&payload)?,
        ),
    )
    .await
    .map_err(|_| completion_error("completion call timed out".to_string()))?
    .map_err(|e| completion_error(e.to_string()))?;
    if !response.is_success() {
        return Err(completion_error(format!(
            "HTTP {}: {}",
            response.status, response.body
        )));
    }

    debug!(oid, "multipart upload completed");

    if let Some(verify_url) = &session.verify_url {
        verify_object(transport.as_ref(), verify_url, oid, size).await;
    }

    Ok(())
}
