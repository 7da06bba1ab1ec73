//! Status channel and termination signal

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IpcError, IpcResult};
use crate::layout::Layout;
use crate::protocol::EngineStatus;
use crate::transport::{remove_if_exists, write_atomic};

/// Content written into the termination marker; readers only check presence
pub const TERMINATION_SIGNAL_CONTENT: &str = "TERMINATE";

/// The single shared lifecycle record written by the worker
#[derive(Debug, Clone)]
pub struct StatusChannel {
    path: PathBuf,
}

impl StatusChannel {
    pub fn new(layout: &Layout) -> Self {
        Self {
            path: layout.status_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, status: &EngineStatus) -> IpcResult<()> {
        let body = serde_json::to_vec_pretty(status)?;
        write_atomic(&self.path, &body).await
    }

    /// Last record, or `None` if nothing has been written
    pub async fn read(&self) -> IpcResult<Option<EngineStatus>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IpcError::io(&self.path, e)),
        };
        let status = serde_json::from_slice(&bytes)?;
        Ok(Some(status))
    }

    /// Remove a record left over from a previous run
    pub async fn clear(&self) -> IpcResult<()> {
        if remove_if_exists(&self.path).await? {
            debug!("Cleared stale status record {}", self.path.display());
        }
        Ok(())
    }
}

/// One-shot cooperative shutdown marker
#[derive(Debug, Clone)]
pub struct TerminationSignal {
    path: PathBuf,
}

impl TerminationSignal {
    pub fn new(layout: &Layout) -> Self {
        Self {
            path: layout.termination_signal_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request shutdown
    pub async fn raise(&self) -> IpcResult<()> {
        tokio::fs::write(&self.path, TERMINATION_SIGNAL_CONTENT)
            .await
            .map_err(|e| IpcError::io(&self.path, e))
    }

    pub async fn is_raised(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Delete the marker if present; returns whether it was raised
    pub async fn consume(&self) -> IpcResult<bool> {
        remove_if_exists(&self.path).await
    }

    pub async fn clear(&self) -> IpcResult<()> {
        remove_if_exists(&self.path).await.map(|_| ())
    }
}
