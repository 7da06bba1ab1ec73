//! Job submission over the file protocol

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tether_config::ProtocolConfig;
use tether_ipc::transport::remove_if_exists;
use tether_ipc::{
    publish_result, read_result, IpcError, JobRequest, JobResult, Layout, RequestQueue, ResultRead,
};
use tether_resilience::{poll_until, PollSchedule, PollStage, RetryExecutor, RetryPolicy, Retryable};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ExecutionError, ExecutionResult};

/// Marker for "no result size observed yet"
const UNSEEN: u64 = u64::MAX;

/// Submits payloads to the engine and waits for their results.
///
/// Concurrent `submit` calls share nothing but the request directory; every
/// job has its own id and scratch directory.
#[derive(Debug, Clone)]
pub struct JobClient {
    layout: Layout,
    queue: RequestQueue,
    schedule: PollSchedule,
    read_retry: RetryExecutor,
    default_timeout: Duration,
}

impl JobClient {
    pub fn new(layout: Layout, config: &ProtocolConfig) -> Self {
        let schedule = PollSchedule::new(
            config
                .poll_stages
                .iter()
                .map(|stage| PollStage {
                    until: stage.until,
                    interval: stage.interval,
                })
                .collect(),
        );
        Self {
            queue: RequestQueue::new(layout.clone()),
            layout,
            schedule,
            read_retry: RetryExecutor::new(RetryPolicy::fixed(
                config.result_read_attempts,
                config.result_read_retry_delay,
            )),
            default_timeout: config.default_job_timeout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `payload` in the engine and return its result.
    ///
    /// Never fails: protocol errors come back as a failed result whose
    /// `error_kind` field carries [`ExecutionError::kind`].
    pub async fn submit(&self, payload: impl AsRef<[u8]>, timeout: Option<Duration>) -> JobResult {
        match self.try_submit(payload, timeout).await {
            Ok(result) => result,
            Err(e) => JobResult::failure(e.to_string())
                .with_field("error_kind", serde_json::Value::from(e.kind())),
        }
    }

    /// Like [`submit`](Self::submit) but with protocol errors kept typed
    #[instrument(skip_all, fields(job_id))]
    pub async fn try_submit(
        &self,
        payload: impl AsRef<[u8]>,
        timeout: Option<Duration>,
    ) -> ExecutionResult<JobResult> {
        let job_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("job_id", job_id.as_str());
        let timeout = timeout.unwrap_or(self.default_timeout);

        let job_dir = self.layout.job_dir(&job_id);
        let payload_path = self.layout.payload_path(&job_id);
        let result_path = self.layout.result_path(&job_id);

        self.layout
            .ensure_dirs()
            .await
            .map_err(|e| ExecutionError::JobIo(e.to_string()))?;
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| job_io("create job directory", &job_dir, e))?;
        if let Err(e) = tokio::fs::write(&payload_path, payload.as_ref()).await {
            self.cleanup(&job_id).await;
            return Err(job_io("write payload", &payload_path, e));
        }

        let request = JobRequest::new(&job_id, payload_path, result_path.clone());
        if let Err(e) = self.queue.enqueue(&request).await {
            self.cleanup(&job_id).await;
            return Err(ExecutionError::JobIo(format!("Failed to write descriptor: {}", e)));
        }
        debug!("Submitted job with timeout {:?}", timeout);

        let result_file = result_path.as_path();
        let outcome = poll_until(&self.schedule, timeout, || async move {
            match read_result(result_file).await {
                Ok(ResultRead::Missing) => None,
                Ok(_) => Some(self.read_settled_result(result_file).await),
                Err(e) if e.is_retryable() => {
                    debug!("Transient error probing result: {}", e);
                    None
                }
                Err(e) => Some(Err(ExecutionError::JobIo(e.to_string()))),
            }
        })
        .await;

        match outcome {
            Some(Ok(result)) => {
                if let Some(reported) = result.request_id.as_deref() {
                    if reported != job_id {
                        warn!("Result correlation mismatch: got {}", reported);
                        self.cleanup(&job_id).await;
                        return Err(ExecutionError::JobIo(format!(
                            "result for job {} carries request id {}",
                            job_id, reported
                        )));
                    }
                }
                self.cleanup(&job_id).await;
                info!(success = result.success, "Job completed");
                Ok(result)
            }
            Some(Err(e)) => {
                if let Err(remove) = self.queue.remove_id(&job_id).await {
                    warn!("Failed to remove descriptor: {}", remove);
                }
                Err(e)
            }
            None => {
                warn!("Job timed out after {:?}", timeout);
                let err = ExecutionError::JobTimeout {
                    job_id: job_id.clone(),
                    timeout,
                };
                let forensic = JobResult::failure(err.to_string())
                    .with_request_id(&job_id)
                    .with_field("timed_out", serde_json::Value::Bool(true));
                match publish_result(&result_path, &forensic).await {
                    Ok(true) => {}
                    Ok(false) => info!("Result arrived at the deadline, keeping the worker's record"),
                    Err(e) => warn!("Failed to record timeout result: {}", e),
                }
                if let Err(e) = self.queue.remove_id(&job_id).await {
                    warn!("Failed to remove descriptor: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Read a result that exists, retrying while it looks partially written.
    ///
    /// A parse is accepted on the first read, or once the file size matches
    /// the previous observation.
    async fn read_settled_result(&self, path: &Path) -> ExecutionResult<JobResult> {
        let last_len = AtomicU64::new(UNSEEN);
        let last_len = &last_len;

        self.read_retry
            .execute(|| async move {
                let read = read_result(path).await.map_err(SettleError::Io)?;
                let previous = last_len.load(Ordering::Relaxed);
                match read {
                    ResultRead::Complete { len, result } => {
                        if previous == UNSEEN || previous == len {
                            Ok(result)
                        } else {
                            last_len.store(len, Ordering::Relaxed);
                            Err(SettleError::Unsettled(format!(
                                "size changed from {} to {} bytes",
                                previous, len
                            )))
                        }
                    }
                    ResultRead::Incomplete { len, reason } => {
                        last_len.store(len, Ordering::Relaxed);
                        Err(SettleError::Unsettled(reason))
                    }
                    ResultRead::Missing => Err(SettleError::Unsettled("result file vanished".to_string())),
                }
            })
            .await
            .map_err(|e| {
                ExecutionError::JobIo(format!(
                    "result {} unreadable after {} attempts: {}",
                    path.display(),
                    e.attempts(),
                    e.into_inner()
                ))
            })
    }

    /// Remove every artifact of a finished job; failures are only logged
    async fn cleanup(&self, job_id: &str) {
        let artifacts = [
            self.layout.payload_path(job_id),
            self.layout.result_path(job_id),
            self.layout.request_path(job_id),
        ];
        for path in artifacts {
            if let Err(e) = remove_if_exists(&path).await {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        let job_dir = self.layout.job_dir(job_id);
        if let Err(e) = tokio::fs::remove_dir(&job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Job directory {} not removed: {}", job_dir.display(), e);
            }
        }
    }

    /// Delete job directories older than `max_age` whose descriptor is gone.
    ///
    /// These are left behind by results that arrived after their caller
    /// timed out. Returns the number of directories removed.
    pub async fn sweep_stale_jobs(&self, max_age: Duration) -> ExecutionResult<usize> {
        let jobs_dir = self.layout.jobs_dir();
        let mut entries = match tokio::fs::read_dir(&jobs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(job_io("list jobs", &jobs_dir, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| job_io("list jobs", &jobs_dir, e))?
        {
            let path = entry.path();
            let Some(job_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_dir() || self.queue.contains(&job_id).await {
                continue;
            }
            let age = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!("Swept stale job directory {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to sweep {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!("Swept {} stale job directories", removed);
        }
        Ok(removed)
    }
}

fn job_io(action: &str, path: &Path, err: std::io::Error) -> ExecutionError {
    ExecutionError::JobIo(format!("Failed to {} {}: {}", action, path.display(), err))
}

/// Why a result read has to be retried
#[derive(Debug)]
enum SettleError {
    Unsettled(String),
    Io(IpcError),
}

impl fmt::Display for SettleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleError::Unsettled(reason) => write!(f, "result not settled: {}", reason),
            SettleError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl Retryable for SettleError {
    fn is_retryable(&self) -> bool {
        match self {
            SettleError::Unsettled(_) => true,
            SettleError::Io(e) => e.is_retryable(),
        }
    }
}
