//! Error types for the hubcommit library.

use thiserror::Error;

/// Main error type for hubcommit operations.
#[derive(Error, Debug)]
pub enum CommitError {
    /// Reading the source content for hashing failed.
    #[error("failed to hash {path}: {source}")]
    Hashing {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Local I/O error while reading upload content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network request error.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An API endpoint returned a non-success status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Preupload or LFS batch negotiation failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A part upload failed permanently (retries exhausted or
    /// non-retryable status).
    #[error("part {part_number} upload failed after {attempts} attempt(s): {reason}")]
    PartUpload {
        part_number: u32,
        attempts: u32,
        reason: String,
    },

    /// The multipart completion call failed.
    #[error("multipart completion failed for {oid}: {reason}")]
    Completion { oid: String, reason: String },

    /// Invalid or unexpected response from the server.
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),

    /// The negotiated chunk size would produce more parts than the
    /// object store accepts.
    #[error("file would require {parts} parts, exceeding the limit of {max}")]
    TooManyParts { parts: u64, max: u64 },

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

/// Result type alias for hubcommit operations.
pub type Result<T> = std::result::Result<T, CommitError>;
