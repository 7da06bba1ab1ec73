//! Directory layout under the protocol root

use crate::error::{IpcError, IpcResult};
use std::path::{Path, PathBuf};

pub const REQUESTS_DIR: &str = "requests";
pub const JOBS_DIR: &str = "jobs";
pub const REQUEST_EXTENSION: &str = "request";
pub const PAYLOAD_FILE: &str = "payload.script";
pub const RESULT_FILE: &str = "result.json";
pub const STATUS_FILE: &str = "session_status.json";
pub const TERMINATION_SIGNAL_FILE: &str = "terminate.signal";
pub const SESSION_LOG_FILE: &str = "session.log";

/// Paths of every protocol artifact, relative to one root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.root.join(REQUESTS_DIR)
    }

    pub fn request_path(&self, job_id: &str) -> PathBuf {
        self.requests_dir()
            .join(format!("{}.{}", job_id, REQUEST_EXTENSION))
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR)
    }

    /// Private scratch directory of one job
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(job_id)
    }

    pub fn payload_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(PAYLOAD_FILE)
    }

    pub fn result_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(RESULT_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn termination_signal_path(&self) -> PathBuf {
        self.root.join(TERMINATION_SIGNAL_FILE)
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.root.join(SESSION_LOG_FILE)
    }

    /// Create the root, request and job directories if missing
    pub async fn ensure_dirs(&self) -> IpcResult<()> {
        for dir in [self.root.clone(), self.requests_dir(), self.jobs_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| IpcError::io(&dir, e))?;
        }
        Ok(())
    }
}
