//! Chunked incremental SHA-256 digesting.
//!
//! Content hashes identify objects in the LFS store, so they must be
//! computed before any network call and without loading the whole input
//! into memory: the hasher consumes one chunk at a time.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{CommitError, Result};

/// Default chunk size for hashing (64 MiB).
pub const DEFAULT_HASH_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Compute the hex-encoded SHA-256 digest of `size` bytes from `reader`,
/// processing at most `chunk_size` bytes in memory at a time.
///
/// `progress` is invoked with the fraction of bytes hashed after each
/// chunk. The digest is independent of `chunk_size`: only the content
/// determines it.
pub async fn sha256_reader<R>(
    reader: &mut R,
    size: u64,
    chunk_size: u64,
    mut progress: impl FnMut(f64),
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    if size == 0 {
        progress(1.0);
        return Ok(hex::encode(hasher.finalize()));
    }

    let chunk_size = chunk_size.max(1);
    let mut buffer = vec![0u8; chunk_size.min(size) as usize];
    let mut remaining = size;
    while remaining > 0 {
        let take = remaining.min(chunk_size) as usize;
        reader.read_exact(&mut buffer[..take]).await?;
        hasher.update(&buffer[..take]);
        remaining -= take as u64;
        progress((size - remaining) as f64 / size as f64);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the hex-encoded SHA-256 digest of a file on disk.
pub async fn sha256_file(
    path: impl AsRef<Path>,
    size: u64,
    chunk_size: u64,
    progress: impl FnMut(f64),
) -> Result<String> {
    let path = path.as_ref();
    let wrap = |source| CommitError::Hashing {
        path: path.display().to_string(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(wrap)?;
    sha256_reader(&mut file, size, chunk_size, progress)
        .await
        .map_err(wrap)
}
