//! Single-shot transfer to one presigned URL.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{CommitError, Result};
use crate::http::{ProgressFn, Transport};
use crate::upload::negotiate::SinglePartSession;
use crate::upload::task::ContentSource;
use crate::upload::verify_object;

/// PUT the whole file to the negotiated URL with exactly the headers the
/// negotiation returned. Unlike multipart parts there is no retry here:
/// the negotiated URL is short-lived and a failed transfer goes back
/// through negotiation.
pub(crate) async fn upload_single_part(
    transport: &Arc<dyn Transport>,
    session: &SinglePartSession,
    source: &ContentSource,
    oid: &str,
    size: u64,
    report: Arc<dyn Fn(f64) + Send + Sync>,
) -> Result<()> {
    debug!(oid, size, "starting single-part upload");

    let body = source.read_all(size).await?;
    let sent = Arc::new(AtomicU64::new(0));
    let hook: ProgressFn = {
        let sent = sent.clone();
        Arc::new(move |bytes| {
            let total = sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
            (report)(total as f64 / size.max(1) as f64);
        })
    };

    let response = transport
        .put(&session.href, &session.headers, body, Some(hook))
        .await?;
    if !response.is_success() {
        return Err(CommitError::Http {
            status: response.status,
            body: response.body,
        });
    }

    debug!(oid, "single-part upload completed");

    if let Some(verify_url) = &session.verify_url {
        verify_object(transport.as_ref(), verify_url, oid, size).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeTransport;
    use bytes::Bytes;
    use std::sync::Mutex;

    fn session() -> SinglePartSession {
        SinglePartSession {
            href: "https://s3/object".to_string(),
            headers: vec![("x-amz-storage-class".to_string(), "STANDARD".to_string())],
            verify_url: Some("https://hub/verify".to_string()),
        }
    }

    #[tokio::test]
    async fn sends_the_negotiated_headers_verbatim() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_post_response("https://hub/verify", "{}");
        let source = ContentSource::Bytes(Bytes::from_static(b"hello world"));

        let dyn_transport: Arc<dyn Transport> = transport.clone();
        upload_single_part(&dyn_transport, &session(), &source, "oid-1", 11, Arc::new(|_| {}))
            .await
            .unwrap();

        let puts = transport.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].url, "https://s3/object");
        assert_eq!(
            puts[0].headers,
            vec![("x-amz-storage-class".to_string(), "STANDARD".to_string())]
        );
        assert_eq!(puts[0].len, 11);
        // Verify rode along after the PUT.
        assert_eq!(transport.posts().len(), 1);
        assert_eq!(transport.posts()[0].url, "https://hub/verify");
    }

    #[tokio::test]
    async fn rejected_put_surfaces_the_status() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_put_status("https://s3/object", 403);
        let source = ContentSource::Bytes(Bytes::from_static(b"hello"));

        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let err = upload_single_part(&dyn_transport, &session(), &source, "oid-1", 5, Arc::new(|_| {}))
            .await
            .unwrap_err();
        match err {
            CommitError::Http { status, .. } => assert_eq!(status, 403),
            other => panic!("unexpected: {other:?}"),
        }
        // No verify on failure.
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn progress_reaches_one_for_the_full_body() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_post_response("https://hub/verify", "{}");
        let source = ContentSource::Bytes(Bytes::from(vec![7u8; 64]));

        let fractions = Arc::new(Mutex::new(Vec::new()));
        let sink = fractions.clone();
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        upload_single_part(
            &dyn_transport,
            &session(),
            &source,
            "oid-1",
            64,
            Arc::new(move |f| sink.lock().unwrap().push(f)),
        )
        .await
        .unwrap();

        let fractions = fractions.lock().unwrap();
        assert!((fractions.last().unwrap() - 1.0).abs() < 1e-9);
    }
}
