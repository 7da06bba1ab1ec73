//! Logging infrastructure for tether
//!
//! - `init` installs the global `tracing` subscriber for the CLI and the
//!   caller side.
//! - `session` provides the append-only session log written from inside the
//!   engine process, which must never fail the code that logs.

pub mod init;
pub mod session;

pub use init::{init_logging_from_config, init_session_logging, init_simple_tracing};
pub use session::{read_log_tail, session_subscriber, SessionLog};
