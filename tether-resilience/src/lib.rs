//! Resilience patterns for tether
//!
//! Progressive polling schedules for waiting on files written by another
//! process, plus backoff calculation and a retry executor for operations
//! that fail transiently.

pub mod backoff;
pub mod poll;
pub mod retry;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use poll::{poll_until, PollSchedule, PollStage};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
