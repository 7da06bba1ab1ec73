//! Caller side of the tether engine bridge
//!
//! [`ProcessSupervisor`] owns the engine's OS process, [`JobClient`] ships
//! payloads to it over the file protocol, and [`EngineSession`] combines the
//! two into the contract used by the request layer.

pub mod auth;
pub mod client;
pub mod error;
pub mod process;
pub mod session;
pub mod supervisor;

// Re-export main types
pub use auth::{ApiKeyEntry, ApiKeyStore};
pub use client::JobClient;
pub use error::{ExecutionError, ExecutionResult};
pub use process::{
    EngineProcess, LaunchSpec, ProcessExit, ProcessLauncher, TokioEngineProcess,
    TokioProcessLauncher,
};
pub use session::{EngineInfo, EngineSession};
pub use supervisor::{EngineHealth, ProcessSupervisor};
