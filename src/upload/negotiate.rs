//! Upload strategy negotiation.
//!
//! Two remote calls decide how each file travels: the batch preupload
//! endpoint (inline-vs-LFS, server-side dedup) and the Git-LFS batch
//! endpoint (presigned upload actions). Negotiation performs no transfers
//! itself; it only fills in each task's strategy and session metadata.

use std::collections::HashMap;
use tracing::debug;

use crate::api::types::{LfsObjectRef, PreuploadFile, UploadAction, UploadMode, VerifyAction};
use crate::api::ApiClient;
use crate::error::{CommitError, Result};
use crate::upload::multipart::MAX_PARTS;
use crate::upload::task::{FileUploadTask, UploadStrategy};

/// Session metadata for a whole-blob PUT.
#[derive(Debug, Clone)]
pub struct SinglePartSession {
    /// Presigned PUT URL.
    pub href: String,
    /// Exact header set the presigned signature requires. Applied verbatim.
    pub headers: Vec<(String, String)>,
    pub verify_url: Option<String>,
}

/// Session metadata for a multipart upload, decomposed from the LFS batch
/// response. Consumed by one upload attempt; never persisted.
#[derive(Debug, Clone)]
pub struct MultipartSession {
    pub upload_id: String,
    pub chunk_size: u64,
    /// Presigned URL per part; index 0 holds part number 1.
    pub part_urls: Vec<String>,
    /// Endpoint receiving the `{oid, size, parts}` completion call.
    pub completion_url: String,
    pub verify_url: Option<String>,
}

/// Resolve the upload strategy for every task in the batch.
///
/// A non-success response from either endpoint aborts the whole
/// negotiation; there is no partial retry.
pub(crate) async fn negotiate(api: &ApiClient, tasks: &mut [FileUploadTask]) -> Result<()> {
    let files = tasks
        .iter()
        .map(|task| {
            let sha256 = task
                .digest
                .clone()
                .ok_or_else(|| CommitError::Custom(format!("digest missing for {}", task.path)))?;
            Ok(PreuploadFile {
                path: task.path.clone(),
                size: task.size,
                sha256,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let verdicts: HashMap<String, _> = api
        .preupload(files)
        .await?
        .into_iter()
        .map(|result| (result.path.clone(), result))
        .collect();

    // First pass: settle skip/inline; collect LFS objects, deduplicated by
    // oid so identical content in one commit negotiates once.
    let mut lfs_objects: Vec<LfsObjectRef> = Vec::new();
    for task in tasks.iter_mut() {
        let verdict = verdicts.get(&task.path).ok_or_else(|| {
            CommitError::InvalidResponse(format!("preupload response missing {}", task.path))
        })?;
        if verdict.should_ignore {
            debug!(path = %task.path, "server already holds identical content");
            task.strategy = Some(UploadStrategy::Skip);
            continue;
        }
        match verdict.upload_mode {
            UploadMode::Inline => task.strategy = Some(UploadStrategy::Inline),
            UploadMode::Lfs => {
                let oid = task.digest.clone().unwrap_or_default();
                if !lfs_objects.iter().any(|o| o.oid == oid) {
                    lfs_objects.push(LfsObjectRef {
                        oid,
                        size: task.size,
                    });
                }
            }
        }
    }

    if lfs_objects.is_empty() {
        return Ok(());
    }

    let batch: HashMap<String, _> = api
        .lfs_batch(lfs_objects)
        .await?
        .into_iter()
        .map(|object| (object.oid.clone(), object))
        .collect();

    for task in tasks.iter_mut() {
        if task.strategy.is_some() {
            continue;
        }
        let oid = task.digest.as_deref().unwrap_or_default();
        let object = batch.get(oid).ok_or_else(|| {
            CommitError::InvalidResponse(format!("LFS batch response missing object {oid}"))
        })?;
        if let Some(error) = &object.error {
            return Err(CommitError::Negotiation(format!(
                "{}: {}",
                task.path, error.message
            )));
        }
        task.strategy = Some(match &object.actions {
            // Empty actions: the object store already has this content.
            None => UploadStrategy::Skip,
            Some(actions) => strategy_from_action(
                task.size,
                &actions.upload,
                actions.verify.as_ref(),
            )?,
        });
    }

    Ok(())
}

/// Interpret an upload action: a `chunk_size` entry in the header map
/// selects the multipart protocol, its absence a single presigned PUT.
fn strategy_from_action(
    size: u64,
    upload: &UploadAction,
    verify: Option<&VerifyAction>,
) -> Result<UploadStrategy> {
    let verify_url = verify.map(|v| v.href.clone());

    let Some(raw_chunk_size) = upload.header.get("chunk_size") else {
        return Ok(UploadStrategy::SinglePart(SinglePartSession {
            href: upload.href.clone(),
            headers: upload
                .header
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            verify_url,
        }));
    };

    let chunk_size: u64 = raw_chunk_size
        .parse()
        .map_err(|_| CommitError::Negotiation(format!("invalid chunk_size {raw_chunk_size:?}")))?;
    if chunk_size == 0 {
        return Err(CommitError::Negotiation("chunk_size must be positive".to_string()));
    }

    let part_count = size.div_ceil(chunk_size).max(1);
    if part_count > MAX_PARTS {
        return Err(CommitError::TooManyParts {
            parts: part_count,
            max: MAX_PARTS,
        });
    }

    let upload_id = upload
        .header
        .get("upload_id")
        .cloned()
        .ok_or_else(|| CommitError::Negotiation("multipart header missing upload_id".to_string()))?;

    let part_urls = (1..=part_count)
        .map(|n| {
            upload.header.get(&n.to_string()).cloned().ok_or_else(|| {
                CommitError::Negotiation(format!("multipart header missing URL for part {n}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(UploadStrategy::Multipart(MultipartSession {
        upload_id,
        chunk_size,
        part_urls,
        completion_url: upload.href.clone(),
        verify_url,
    }))
}
