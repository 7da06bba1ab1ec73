//! File-based job protocol for tether
//!
//! This crate defines the on-disk contract between the caller side (process
//! supervisor and job client) and the worker running inside the engine
//! process: the directory layout, the request queue, result files, the
//! status channel and the termination signal.

pub mod error;
pub mod layout;
pub mod protocol;
pub mod status;
pub mod transport;

// Re-export commonly used types
pub use error::{IpcError, IpcResult};
pub use layout::Layout;
pub use protocol::{now_timestamp, EngineState, EngineStatus, JobRequest, JobResult};
pub use status::{StatusChannel, TerminationSignal};
pub use transport::{
    publish_result, read_result, write_atomic, write_new, write_result, PendingRequest, RequestQueue,
    ResultRead,
};
