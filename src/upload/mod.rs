//! File upload pipeline: digest, negotiate, transfer.

pub mod multipart;
pub mod negotiate;
pub mod retry;
pub mod single;
pub mod task;

pub use multipart::MAX_PARTS;
pub use negotiate::{MultipartSession, SinglePartSession};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use task::{ContentSource, FileUploadTask, UploadStrategy};

use tokio::time::timeout;
use tracing::warn;

use crate::api::client::API_TIMEOUT;
use crate::api::types::VerifyPayload;
use crate::http::Transport;

/// Post-upload verification callback. Best effort only: the object is
/// already durable when this runs, so any failure is logged and swallowed.
pub(crate) async fn verify_object(transport: &dyn Transport, url: &str, oid: &str, size: u64) {
    let payload = VerifyPayload {
        oid: oid.to_string(),
        size,
    };
    let body = match serde_json::to_string(&payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(oid, error = %e, "skipping upload verification");
            return;
        }
    };
    match timeout(API_TIMEOUT, transport.post(url, &[], "application/json", body)).await {
        Ok(Ok(response)) if response.is_success() => {}
        Ok(Ok(response)) => {
            warn!(oid, status = response.status, "upload verification rejected");
        }
        Ok(Err(e)) => warn!(oid, error = %e, "upload verification failed"),
        Err(_) => warn!(oid, "upload verification timed out"),
    }
}
