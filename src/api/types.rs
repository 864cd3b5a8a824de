//! Wire types for the hub's negotiation endpoints.
//!
//! These mirror the documented server contracts: the batch preupload
//! endpoint, the Git-LFS batch endpoint, and the S3 multipart
//! completion/verify payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Preupload endpoint
// =============================================================================

#[derive(Debug, Serialize)]
pub struct PreuploadRequest {
    pub files: Vec<PreuploadFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreuploadFile {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
pub struct PreuploadResponse {
    pub files: Vec<PreuploadResult>,
}

/// Per-file verdict from the preupload endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreuploadResult {
    pub path: String,
    /// Server already holds identical content for this path.
    pub should_ignore: bool,
    pub upload_mode: UploadMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Inline,
    Lfs,
}

// =============================================================================
// LFS batch endpoint (Git LFS protocol-compatible)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LfsBatchRequest {
    pub operation: &'static str,
    pub transfers: Vec<&'static str>,
    pub objects: Vec<LfsObjectRef>,
    pub hash_algo: &'static str,
    pub is_browser: bool,
}

impl LfsBatchRequest {
    pub fn upload(objects: Vec<LfsObjectRef>) -> Self {
        Self {
            operation: "upload",
            transfers: vec!["basic"],
            objects,
            hash_algo: "sha256",
            is_browser: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfsObjectRef {
    pub oid: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct LfsBatchResponse {
    pub objects: Vec<BatchObject>,
}

/// Per-object response from the LFS batch endpoint.
///
/// No `actions` means the store already holds the object. For an upload
/// action, the `header` map carries the exact headers the presigned PUT
/// signature requires; a `chunk_size` entry switches the object to the
/// multipart protocol, with `upload_id` and numeric keys `"1".."N"` each
/// holding a per-part presigned URL.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchObject {
    pub oid: String,
    pub size: u64,
    #[serde(default)]
    pub actions: Option<BatchActions>,
    #[serde(default)]
    pub error: Option<BatchObjectError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchActions {
    pub upload: UploadAction,
    #[serde(default)]
    pub verify: Option<VerifyAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadAction {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyAction {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchObjectError {
    pub message: String,
}

// =============================================================================
// Multipart completion and verify payloads
// =============================================================================

/// A successfully uploaded part: its 1-indexed number and the ETag the
/// storage backend returned (surrounding quotes stripped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartResult {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionPayload {
    pub oid: String,
    pub size: u64,
    pub parts: Vec<PartResult>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPayload {
    pub oid: String,
    pub size: u64,
}
