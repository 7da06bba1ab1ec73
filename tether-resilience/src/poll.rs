//! Progressive polling for files produced by another process

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// One stage of a polling schedule: poll every `interval` while the elapsed
/// wait is below `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStage {
    pub until: Option<Duration>,
    pub interval: Duration,
}

/// Polling interval that grows with the time already spent waiting.
///
/// Short intervals keep quick jobs responsive; longer ones reduce
/// filesystem load for slow jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    stages: Vec<PollStage>,
}

impl PollSchedule {
    /// Build a schedule; stages are sorted by their bound, unbounded last
    pub fn new(mut stages: Vec<PollStage>) -> Self {
        stages.sort_by_key(|s| s.until.unwrap_or(Duration::MAX));
        Self { stages }
    }

    /// A single fixed interval
    pub fn fixed(interval: Duration) -> Self {
        Self::new(vec![PollStage {
            until: None,
            interval,
        }])
    }

    /// Interval to use after `elapsed` of waiting
    pub fn interval_for(&self, elapsed: Duration) -> Duration {
        self.stages
            .iter()
            .find(|stage| stage.until.map_or(true, |until| elapsed < until))
            .or_else(|| self.stages.last())
            .map(|stage| stage.interval)
            .unwrap_or(Duration::from_secs(1))
    }

    /// Next sleep, never extending past `remaining`
    pub fn next_delay(&self, elapsed: Duration, remaining: Duration) -> Duration {
        self.interval_for(elapsed).min(remaining)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(vec![
            PollStage {
                until: Some(Duration::from_secs(5)),
                interval: Duration::from_millis(100),
            },
            PollStage {
                until: Some(Duration::from_secs(30)),
                interval: Duration::from_millis(500),
            },
            PollStage {
                until: None,
                interval: Duration::from_secs(1),
            },
        ])
    }
}

/// Repeatedly run `check` until it yields a value or `timeout` elapses.
///
/// `check` always runs at least once and once more at the deadline, so a
/// condition that becomes true during the final sleep is still observed.
pub async fn poll_until<F, Fut, T>(
    schedule: &PollSchedule,
    timeout: Duration,
    mut check: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return None;
        }
        sleep(schedule.next_delay(elapsed, timeout - elapsed)).await;
    }
}
