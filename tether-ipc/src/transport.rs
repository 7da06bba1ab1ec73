//! File transport: atomic writes, the request queue and result files

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IpcError, IpcResult};
use crate::layout::{Layout, REQUEST_EXTENSION};
use crate::protocol::{JobRequest, JobResult};

/// Write `contents` so that readers observe either the old file or the
/// complete new one.
///
/// The data goes to a hidden sibling temp file first and is then renamed
/// over `path`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> IpcResult<()> {
    let tmp = temp_sibling(path)?;
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| IpcError::io(&tmp, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        discard_temp(&tmp).await;
        return Err(IpcError::io(path, e));
    }
    Ok(())
}

/// Publish `contents` at `path` unless something is already there.
///
/// Readers only ever see the complete file. The temp file is hard-linked
/// into place, which fails instead of replacing an existing file. Returns
/// `false` when `path` was taken.
pub async fn write_new(path: &Path, contents: &[u8]) -> IpcResult<bool> {
    let tmp = temp_sibling(path)?;
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| IpcError::io(&tmp, e))?;

    let linked = tokio::fs::hard_link(&tmp, path).await;
    discard_temp(&tmp).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(IpcError::io(path, e)),
    }
}

fn temp_sibling(path: &Path) -> IpcResult<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| IpcError::InvalidMessage(format!("{} has no parent", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| IpcError::InvalidMessage(format!("{} has no file name", path.display())))?
        .to_string_lossy();
    Ok(parent.join(format!(
        ".{}.{}.tmp",
        file_name,
        uuid::Uuid::new_v4().simple()
    )))
}

async fn discard_temp(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        debug!("Failed to remove temp file {}: {}", tmp.display(), e);
    }
}

/// Remove a file, treating an already missing file as success
pub async fn remove_if_exists(path: &Path) -> IpcResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(IpcError::io(path, e)),
    }
}

/// A descriptor found in the request directory
#[derive(Debug)]
pub struct PendingRequest {
    /// Location of the descriptor file
    pub path: PathBuf,
    /// Job id taken from the descriptor file name
    pub job_id: String,
    /// Parsed descriptor, or why it could not be read
    pub descriptor: IpcResult<JobRequest>,
}

impl PendingRequest {
    fn timestamp(&self) -> f64 {
        self.descriptor
            .as_ref()
            .map(|r| r.timestamp)
            .unwrap_or(f64::INFINITY)
    }
}

/// Many-producer, single-consumer queue backed by the request directory
#[derive(Debug, Clone)]
pub struct RequestQueue {
    layout: Layout,
}

impl RequestQueue {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Publish a descriptor; it becomes visible to the worker atomically
    pub async fn enqueue(&self, request: &JobRequest) -> IpcResult<PathBuf> {
        let path = self.layout.request_path(&request.request_id);
        let body = serde_json::to_vec_pretty(request)?;
        write_atomic(&path, &body).await?;
        debug!(job_id = %request.request_id, "Enqueued request {}", path.display());
        Ok(path)
    }

    /// Pending descriptors, oldest first.
    ///
    /// Ordering is by descriptor timestamp, then file name. Descriptors that
    /// cannot be parsed sort last but are still returned so the consumer
    /// can answer them.
    pub async fn pending(&self) -> IpcResult<Vec<PendingRequest>> {
        let dir = self.layout.requests_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IpcError::io(&dir, e)),
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IpcError::io(&dir, e))?
        {
            let path = entry.path();
            let Some(job_id) = request_id_from_path(&path) else {
                continue;
            };
            let descriptor = read_request(&path).await;
            pending.push(PendingRequest {
                path,
                job_id,
                descriptor,
            });
        }

        pending.sort_by(|a, b| {
            a.timestamp()
                .partial_cmp(&b.timestamp())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(pending)
    }

    /// Whether a descriptor for `job_id` is still queued
    pub async fn contains(&self, job_id: &str) -> bool {
        tokio::fs::try_exists(self.layout.request_path(job_id))
            .await
            .unwrap_or(false)
    }

    /// Remove a descriptor; missing descriptors are not an error
    pub async fn remove(&self, path: &Path) -> IpcResult<()> {
        remove_if_exists(path).await.map(|_| ())
    }

    pub async fn remove_id(&self, job_id: &str) -> IpcResult<()> {
        self.remove(&self.layout.request_path(job_id)).await
    }
}

fn request_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    if path.extension()?.to_str()? != REQUEST_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

async fn read_request(path: &Path) -> IpcResult<JobRequest> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IpcError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| IpcError::InvalidMessage(e.to_string()))
}

/// Write a job result atomically
pub async fn write_result(path: &Path, result: &JobResult) -> IpcResult<()> {
    let body = serde_json::to_vec_pretty(result)?;
    write_atomic(path, &body).await
}

/// Write a job result unless one was already published.
///
/// Result files are final once written; `false` means an earlier result
/// was kept and `result` was dropped.
pub async fn publish_result(path: &Path, result: &JobResult) -> IpcResult<bool> {
    let body = serde_json::to_vec_pretty(result)?;
    write_new(path, &body).await
}

/// One observation of a result file
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRead {
    /// No result file yet
    Missing,
    /// The file exists but does not hold a well-formed result
    Incomplete { len: u64, reason: String },
    /// A well-formed result
    Complete { len: u64, result: JobResult },
}

/// Observe a result file once, without retrying
pub async fn read_result(path: &Path) -> IpcResult<ResultRead> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ResultRead::Missing),
        Err(e) => return Err(IpcError::io(path, e)),
    };
    let len = bytes.len() as u64;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ResultRead::Incomplete {
            len,
            reason: "empty file".to_string(),
        });
    }

    match serde_json::from_slice::<JobResult>(&bytes) {
        Ok(result) => Ok(ResultRead::Complete {
            len,
            result: result.normalized(),
        }),
        Err(e) => {
            debug!("Result file {} not parseable yet: {}", path.display(), e);
            Ok(ResultRead::Incomplete {
                len,
                reason: e.to_string(),
            })
        }
    }
}
