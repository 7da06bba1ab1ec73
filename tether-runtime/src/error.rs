//! Runtime error types

use tether_ipc::IpcError;
use tether_resilience::Retryable;
use thiserror::Error;

/// Worker lifecycle errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Engine initialization failed after {attempts} attempts: {message}")]
    Initialization { attempts: u32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] IpcError),

    /// The job scanning task ended abnormally
    #[error("Job scanner failed: {0}")]
    Scanner(String),
}

/// Errors raised while running a payload
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The payload itself failed
    #[error("{message}")]
    Failed {
        message: String,
        traceback: Option<String>,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The hosting system is not usable yet
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

impl ScriptError {
    pub fn failed(message: impl Into<String>) -> Self {
        ScriptError::Failed {
            message: message.into(),
            traceback: None,
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            ScriptError::Failed { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

impl Retryable for ScriptError {
    fn is_retryable(&self) -> bool {
        !matches!(self, ScriptError::InvalidPayload(_))
    }
}
