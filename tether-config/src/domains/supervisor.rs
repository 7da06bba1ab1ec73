//! Engine process supervision configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_not_longer, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Start/stop timing for the engine process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum time `start` waits for a status record
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub start_timeout: Duration,

    #[serde(rename = "start_poll_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub start_poll_interval: Duration,

    /// Time the engine gets to honour the termination signal
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub graceful_stop_timeout: Duration,

    /// Time the engine gets after a terminate request
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub terminate_timeout: Duration,

    /// Time allowed for the OS to reap a killed engine
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub kill_timeout: Duration,

    #[serde(rename = "stop_poll_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub stop_poll_interval: Duration,

    /// Pause between stop and start on restart
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub restart_delay: Duration,

    /// Status records older than this are considered stale
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub status_stale_after: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            start_poll_interval: Duration::from_millis(500),
            graceful_stop_timeout: Duration::from_secs(10),
            terminate_timeout: Duration::from_secs(2),
            kill_timeout: Duration::from_secs(5),
            stop_poll_interval: Duration::from_millis(250),
            restart_delay: Duration::from_secs(2),
            status_stale_after: Duration::from_secs(30),
        }
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_duration(self.start_timeout, "start_timeout", domain)?;
        validate_duration(self.start_poll_interval, "start_poll_interval_ms", domain)?;
        validate_duration(self.kill_timeout, "kill_timeout", domain)?;
        validate_duration(self.stop_poll_interval, "stop_poll_interval_ms", domain)?;
        validate_duration(self.status_stale_after, "status_stale_after", domain)?;
        validate_not_longer(
            self.start_poll_interval,
            "start_poll_interval_ms",
            self.start_timeout,
            "start_timeout",
            domain,
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}
