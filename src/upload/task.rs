//! Per-file upload tasks and their content sources.

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

use crate::digest;
use crate::error::Result;
use crate::upload::negotiate::{MultipartSession, SinglePartSession};

/// Where a file's bytes come from.
///
/// On-disk sources are re-opened per read so concurrent part uploads never
/// share a file cursor; in-memory sources are cheap slices.
#[derive(Debug, Clone)]
pub enum ContentSource {
    Path(PathBuf),
    Bytes(Bytes),
}

impl ContentSource {
    /// Total size of the content in bytes.
    pub async fn size(&self) -> Result<u64> {
        match self {
            Self::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// Read the half-open byte range `[start, end)`.
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        match self {
            Self::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buffer = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
            Self::Bytes(bytes) => Ok(bytes.slice(start as usize..end as usize)),
        }
    }

    /// Read the full content.
    pub async fn read_all(&self, size: u64) -> Result<Bytes> {
        self.read_range(0, size).await
    }

    /// Compute the hex SHA-256 digest of the content.
    pub async fn digest(&self, chunk_size: u64, progress: impl FnMut(f64)) -> Result<String> {
        match self {
            Self::Path(path) => {
                let size = self.size().await?;
                digest::sha256_file(path, size, chunk_size, progress).await
            }
            Self::Bytes(bytes) => {
                let mut cursor = std::io::Cursor::new(bytes.clone());
                Ok(digest::sha256_reader(&mut cursor, bytes.len() as u64, chunk_size, progress)
                    .await?)
            }
        }
    }
}

/// How a file will reach the server, decided by negotiation.
#[derive(Debug, Clone)]
pub enum UploadStrategy {
    /// Server already holds identical content; nothing to transfer and no
    /// commit operation.
    Skip,
    /// Content travels base64-encoded inside the commit payload itself.
    Inline,
    /// Whole-blob PUT to a presigned URL.
    SinglePart(SinglePartSession),
    /// Chunked upload through per-part presigned URLs.
    Multipart(MultipartSession),
}

/// One file queued for a commit. The digest is filled in before any
/// network call; the strategy is filled in by negotiation.
#[derive(Debug)]
pub struct FileUploadTask {
    /// Destination path inside the repository.
    pub path: String,
    pub source: ContentSource,
    pub size: u64,
    pub digest: Option<String>,
    pub strategy: Option<UploadStrategy>,
}

impl FileUploadTask {
    pub fn new(path: String, source: ContentSource, size: u64) -> Self {
        Self {
            path,
            source,
            size,
            digest: None,
            strategy: None,
        }
    }

    /// Compute and store the content digest.
    pub async fn compute_digest(&mut self, chunk_size: u64) -> Result<&str> {
        if self.digest.is_none() {
            self.digest = Some(self.source.digest(chunk_size, |_| {}).await?);
        }
        Ok(self.digest.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn bytes_source_range_reads() {
        let source = ContentSource::Bytes(Bytes::from_static(b"0123456789"));
        assert_eq!(source.size().await.unwrap(), 10);
        assert_eq!(source.read_range(2, 5).await.unwrap().as_ref(), b"234");
        assert_eq!(source.read_all(10).await.unwrap().as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn path_source_matches_bytes_source() {
        let content: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&content).unwrap();

        let on_disk = ContentSource::Path(tmp.path().to_path_buf());
        let in_memory = ContentSource::Bytes(Bytes::from(content));

        assert_eq!(on_disk.size().await.unwrap(), 2000);
        assert_eq!(
            on_disk.read_range(100, 300).await.unwrap(),
            in_memory.read_range(100, 300).await.unwrap()
        );
        assert_eq!(
            on_disk.digest(256, |_| {}).await.unwrap(),
            in_memory.digest(512, |_| {}).await.unwrap()
        );
    }

    #[tokio::test]
    async fn digest_is_cached_on_the_task() {
        let mut task = FileUploadTask::new(
            "a.bin".to_string(),
            ContentSource::Bytes(Bytes::from_static(b"abc")),
            3,
        );
        let first = task.compute_digest(64).await.unwrap().to_string();
        let second = task.compute_digest(1).await.unwrap().to_string();
        assert_eq!(first, second);
        assert_eq!(
            first,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
