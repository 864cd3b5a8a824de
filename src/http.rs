//! HTTP transport for API and object-storage requests.
//!
//! All network traffic goes through the [`Transport`] trait so the upload
//! pipeline can be exercised against fakes. [`ReqwestTransport`] is the
//! production implementation, holding the single shared `reqwest::Client`.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::{CommitError, Result};

/// Callback invoked with the byte count of each body chunk handed to the
/// connection during a PUT.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Chunk granularity for streamed PUT bodies.
const STREAM_STEP: usize = 64 * 1024;

/// Response from a transport request.
///
/// Transports only fail on connection-level errors; HTTP error statuses are
/// returned to the caller, which needs them to tell retryable failures from
/// permission/signature errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `ETag` response header, if present (quotes not stripped).
    pub etag: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-success response into a `CommitError::Http`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CommitError::Http {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Abstraction over the HTTP operations the upload pipeline needs.
pub trait Transport: Send + Sync {
    /// PUT a binary body to `url`.
    ///
    /// `headers` are applied verbatim and nothing else is added: presigned
    /// URLs are signature-sensitive, and extra headers would also trigger a
    /// CORS preflight that invalidates the signature. An empty slice sends
    /// a bare PUT.
    ///
    /// No timeout is applied; content PUTs may run arbitrarily long over
    /// slow links.
    fn put<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        body: Bytes,
        progress: Option<ProgressFn>,
    ) -> BoxFuture<'a, Result<HttpResponse>>;

    /// POST a textual body with the given content type.
    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        content_type: &'a str,
        body: String,
    ) -> BoxFuture<'a, Result<HttpResponse>>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.text().await?;
    Ok(HttpResponse { status, etag, body })
}

impl Transport for ReqwestTransport {
    fn put<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        body: Bytes,
        progress: Option<ProgressFn>,
    ) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            let total = body.len();
            let mut request = self
                .client
                .put(url)
                .header(reqwest::header::CONTENT_LENGTH, total as u64);
            for (name, value) in headers {
                request = request.header(name, value);
            }

            let request = match progress {
                Some(report) => {
                    // Stream the body in fixed steps so progress advances
                    // as the connection consumes it, instead of jumping to
                    // 100% when the request is handed off.
                    let chunks = (0..total.max(1)).step_by(STREAM_STEP).map(move |start| {
                        let end = (start + STREAM_STEP).min(total);
                        let chunk = body.slice(start..end);
                        report(chunk.len() as u64);
                        Ok::<_, std::convert::Infallible>(chunk)
                    });
                    request.body(reqwest::Body::wrap_stream(futures::stream::iter(chunks)))
                }
                None => request.body(body),
            };

            read_response(request.send().await?).await
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        content_type: &'a str,
        body: String,
    ) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            read_response(request.send().await?).await
        })
    }
}
