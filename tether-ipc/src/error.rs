//! IPC error types

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for protocol operations
pub type IpcResult<T> = Result<T, IpcError>;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error on {path}: {message}")]
    IoError { path: PathBuf, message: String },

    /// A file that must exist is missing
    #[error("File not found: {0}")]
    MissingFile(PathBuf),

    /// A file exists but its content is not (yet) complete
    #[error("Incomplete content in {path}: {reason}")]
    IncompleteContent { path: PathBuf, reason: String },

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

impl IpcError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IpcError::MissingFile(path)
        } else {
            IpcError::IoError {
                path,
                message: err.to_string(),
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IpcError::IoError { .. } | IpcError::IncompleteContent { .. }
        )
    }

    /// Check if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::InvalidMessage(_) | IpcError::SerializationError(_)
        )
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let io = IpcError::IoError {
            path: PathBuf::from("/tmp/x"),
            message: "busy".to_string(),
        };
        assert!(io.is_retryable());
        assert!(IpcError::IncompleteContent {
            path: PathBuf::from("/tmp/x"),
            reason: "EOF".to_string()
        }
        .is_retryable());
        assert!(!IpcError::MissingFile(PathBuf::from("/tmp/x")).is_retryable());
        assert!(!IpcError::InvalidMessage("bad format".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_maps_to_missing_file() {
        let err = IpcError::io(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, IpcError::MissingFile(_)));
        assert!(err.to_string().contains("/tmp/missing"));
    }

    #[test]
    fn test_error_fatal() {
        assert!(IpcError::InvalidMessage("bad format".to_string()).is_fatal());
        assert!(!IpcError::MissingFile(PathBuf::from("/tmp/x")).is_fatal());
    }
}
