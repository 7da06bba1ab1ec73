//! Engine-side worker loop configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause between scans of the request directory
    #[serde(rename = "scan_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub scan_interval: Duration,

    /// Main loop period (termination checks)
    #[serde(rename = "tick_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub tick_interval: Duration,

    /// Period of the `running` status heartbeat
    #[serde(rename = "heartbeat_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub heartbeat_interval: Duration,

    /// Engine initialisation attempts before giving up
    pub init_attempts: u32,

    #[serde(rename = "init_retry_delay_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub init_retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
            tick_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(1),
            init_attempts: 3,
            init_retry_delay: Duration::from_secs(1),
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_duration(self.scan_interval, "scan_interval_ms", domain)?;
        validate_duration(self.tick_interval, "tick_interval_ms", domain)?;
        validate_duration(self.heartbeat_interval, "heartbeat_interval_ms", domain)?;
        validate_positive(self.init_attempts, "init_attempts", domain)?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}
