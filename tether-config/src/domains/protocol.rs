//! File protocol configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by the job client and the job worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Root directory holding requests, jobs, status and signal files
    pub root_dir: PathBuf,

    /// Timeout applied when a caller does not provide one
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub default_job_timeout: Duration,

    /// Progressive result polling intervals
    pub poll_stages: Vec<PollStageConfig>,

    /// Read attempts for a result file that looks partially written
    pub result_read_attempts: u32,

    /// Delay between partial-result read attempts
    #[serde(rename = "result_read_retry_delay_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub result_read_retry_delay: Duration,

    /// Age after which orphaned job directories may be swept
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub stale_job_age: Duration,
}

/// One stage of the progressive polling schedule.
///
/// A stage applies while the elapsed wait is below `until`; the last stage
/// usually has no bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollStageConfig {
    #[serde(
        rename = "until_ms",
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::domains::utils::serde_duration_ms_option"
    )]
    pub until: Option<Duration>,

    #[serde(rename = "interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("tether-root"),
            default_job_timeout: Duration::from_secs(300),
            poll_stages: default_poll_stages(),
            result_read_attempts: 5,
            result_read_retry_delay: Duration::from_millis(100),
            stale_job_age: Duration::from_secs(3600),
        }
    }
}

fn default_poll_stages() -> Vec<PollStageConfig> {
    vec![
        PollStageConfig {
            until: Some(Duration::from_secs(5)),
            interval: Duration::from_millis(100),
        },
        PollStageConfig {
            until: Some(Duration::from_secs(30)),
            interval: Duration::from_millis(500),
        },
        PollStageConfig {
            until: None,
            interval: Duration::from_secs(1),
        },
    ]
}

impl Validatable for ProtocolConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(self.validation_error("root_dir cannot be empty"));
        }

        validate_duration(self.default_job_timeout, "default_job_timeout", self.domain_name())?;
        validate_positive(self.result_read_attempts, "result_read_attempts", self.domain_name())?;
        validate_duration(self.stale_job_age, "stale_job_age", self.domain_name())?;

        if self.poll_stages.is_empty() {
            return Err(self.validation_error("poll_stages must contain at least one stage"));
        }

        let mut previous: Option<Duration> = None;
        for (index, stage) in self.poll_stages.iter().enumerate() {
            validate_duration(stage.interval, "poll_stages.interval_ms", self.domain_name())?;
            match (previous, stage.until) {
                (Some(prev), Some(until)) if until <= prev => {
                    return Err(self.validation_error(format!(
                        "poll stage {} ends before the previous stage",
                        index
                    )));
                }
                _ => {}
            }
            if stage.until.is_none() && index + 1 != self.poll_stages.len() {
                return Err(self.validation_error("only the last poll stage may be unbounded"));
            }
            previous = stage.until;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "protocol"
    }
}
