//! # hubcommit
//!
//! Rust client library for committing files to an LFS-backed model hub.
//!
//! ## Features
//!
//! - **Content addressing**: Chunked SHA-256 digesting of arbitrarily large
//!   files with bounded memory.
//! - **Negotiation**: Batch preupload (inline-vs-LFS, server-side dedup)
//!   and Git-LFS batch calls decide how each file travels before any byte
//!   is transferred.
//! - **Transfers**:
//!   - Whole-blob PUTs to presigned URLs with the exact negotiated headers.
//!   - Multipart uploads through per-part presigned URLs with bounded
//!     concurrency and per-part retry with exponential backoff.
//!   - Byte-weighted progress aggregation across the whole batch via a
//!     custom observer.
//! - **Atomic commits**: An ordered NDJSON operation log (header, files,
//!   deletions) submitted only after every transfer succeeded.
//!
//! ## Example: Committing Files
//!
//! ```no_run
//! use hubcommit::{CommitFile, CommitRequest, ContentSource, Endpoints, HubClient};
//!
//! # async fn example() -> hubcommit::Result<()> {
//! let client = HubClient::new(
//!     Endpoints {
//!         preupload_url: "https://hub.example/api/models/me/repo/preupload/main".into(),
//!         lfs_batch_url: "https://hub.example/me/repo.git/info/lfs/objects/batch".into(),
//!         commit_url: "https://hub.example/api/models/me/repo/commit/main".into(),
//!     },
//!     Some("api-token".into()),
//! );
//!
//! let request = CommitRequest {
//!     summary: "Add model weights".into(),
//!     description: None,
//!     files: vec![CommitFile {
//!         path: "weights.bin".into(),
//!         source: ContentSource::Path("local/weights.bin".into()),
//!     }],
//!     deletes: vec!["old-weights.bin".into()],
//! };
//! client.commit(request, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod commit;
pub mod digest;
pub mod error;
pub mod http;
pub mod progress;
pub mod upload;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiClient, Endpoints};
pub use commit::{CommitFile, CommitOperation, CommitRequest, HubClient, UploadConfig};
pub use error::{CommitError, Result};
pub use http::{HttpResponse, ProgressFn, ReqwestTransport, Transport};
pub use progress::{ProgressObserver, TransferProgress};
pub use upload::{
    ContentSource, FileUploadTask, MultipartSession, RetryPolicy, SinglePartSession, Sleeper,
    TokioSleeper, UploadStrategy,
};
