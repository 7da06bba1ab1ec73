//! Error types for engine supervision and job submission

use std::time::Duration;
use thiserror::Error;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Supervision and job errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Executable missing, spawn failure, or exit during startup
    #[error("Failed to launch engine: {0}")]
    ProcessLaunch(String),

    /// Forced termination did not take effect
    #[error("Failed to terminate engine: {0}")]
    ProcessTermination(String),

    /// Payload, descriptor or result file could not be written or read
    #[error("Job I/O error: {0}")]
    JobIo(String),

    #[error("Job {job_id} timed out after {:.1}s", .timeout.as_secs_f64())]
    JobTimeout { job_id: String, timeout: Duration },

    /// The engine is not in a state to accept work
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IPC error: {0}")]
    Ipc(#[from] tether_ipc::IpcError),
}

impl ExecutionError {
    /// Stable machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::ProcessLaunch(_) => "process_launch",
            ExecutionError::ProcessTermination(_) => "process_termination",
            ExecutionError::JobIo(_) => "job_io",
            ExecutionError::JobTimeout { .. } => "job_timeout",
            ExecutionError::Unavailable(_) => "unavailable",
            ExecutionError::Configuration(_) => "configuration",
            ExecutionError::Ipc(_) => "ipc",
        }
    }
}

impl From<tether_config::ConfigError> for ExecutionError {
    fn from(err: tether_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
