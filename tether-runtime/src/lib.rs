//! Engine-side runtime for tether
//!
//! The [`JobWorker`] runs inside the supervised engine process. It picks up
//! request descriptors one at a time, executes their payloads through a
//! [`ScriptEngine`] against the single [`ExecutionContext`], writes results,
//! and keeps the status channel fresh until the termination signal appears.

pub mod context;
pub mod engine;
pub mod error;
pub mod step;
pub mod worker;

// Re-export commonly used types
pub use context::{ContextSnapshot, ExecutionContext, UnitOfWork};
pub use engine::ScriptEngine;
pub use error::{ScriptError, WorkerError};
pub use step::StepScriptEngine;
pub use worker::{worker_main, JobExecutor, JobWorker};
