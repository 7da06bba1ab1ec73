//! Job worker running inside the engine process
//!
//! Two loops cooperate. The scanning loop owns the [`JobExecutor`] and with
//! it the [`ExecutionContext`]; it takes one descriptor at a time, runs it to
//! completion, writes the result and only then deletes the descriptor. The
//! main loop never touches the context: it refreshes the status channel on a
//! fixed period from a snapshot published by the scanner, and watches for
//! the termination signal.

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::{json, Map};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use tether_config::WorkerConfig;
use tether_ipc::{
    publish_result, EngineState, EngineStatus, JobRequest, JobResult, Layout, RequestQueue,
    StatusChannel, TerminationSignal,
};
use tether_resilience::{RetryExecutor, RetryPolicy};

use crate::context::{ContextSnapshot, ExecutionContext};
use crate::engine::ScriptEngine;
use crate::error::{ScriptError, WorkerError};

/// Message on results of payloads that finished without producing one
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Script executed successfully (no result variable)";

/// Ceiling for the doubling delay between engine initialisation attempts
const INIT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Worker process main entry point
pub async fn worker_main(
    config: WorkerConfig,
    layout: Layout,
    engine: Box<dyn ScriptEngine>,
) -> Result<(), WorkerError> {
    info!(
        "Starting {} worker in {} (pid {})",
        engine.name(),
        layout.root().display(),
        std::process::id()
    );

    let mut worker = JobWorker::new(config, layout, engine);
    worker.initialize().await?;
    worker.run().await?;

    info!("Worker process {} shutting down", std::process::id());
    Ok(())
}

/// Executes jobs one at a time against the execution context
pub struct JobExecutor {
    engine: Box<dyn ScriptEngine>,
    context: ExecutionContext,
    queue: RequestQueue,
    layout: Layout,
    executed_by: String,
}

impl JobExecutor {
    pub fn new(layout: Layout, engine: Box<dyn ScriptEngine>) -> Self {
        let executed_by = format!("{}@{}", engine.name(), std::process::id());
        Self {
            engine,
            context: ExecutionContext::new(),
            queue: RequestQueue::new(layout.clone()),
            layout,
            executed_by,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Initialise the engine, retrying transient failures per `policy`
    pub async fn initialize_engine(&mut self, policy: &RetryPolicy) -> Result<(), WorkerError> {
        let retry = RetryExecutor::new(policy.clone());
        let attempts = AtomicU32::new(0);

        let outcome = {
            let shared = Mutex::new((&mut self.engine, &mut self.context));
            let (shared, attempts) = (&shared, &attempts);
            retry
                .execute_with_context(|attempt| async move {
                    attempts.store(attempt, Ordering::Relaxed);
                    debug!("Engine initialization attempt {}", attempt);
                    let mut guard = shared.lock().await;
                    let (engine, context) = &mut *guard;
                    engine.initialize(&mut **context).await
                })
                .await
        };

        match outcome {
            Ok(()) => {
                info!(
                    "Engine {} initialized (system available: {})",
                    self.engine.name(),
                    self.context.system_available
                );
                Ok(())
            }
            Err(e) => {
                let attempts = attempts.load(Ordering::Relaxed);
                let e = e.into_inner();
                error!("Engine initialization failed after {} attempts: {}", attempts, e);
                Err(WorkerError::Initialization {
                    attempts,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Process the oldest pending descriptor, if any.
    ///
    /// Returns the id of the processed job. A result file is written for
    /// every descriptor taken, including unreadable ones.
    pub async fn process_next(&mut self) -> Result<Option<String>, WorkerError> {
        let pending = self.queue.pending().await?;
        let Some(next) = pending.into_iter().next() else {
            return Ok(None);
        };

        let (result_path, result) = match next.descriptor {
            Ok(request) => {
                let result = self.execute_job(&request).await;
                (request.result_path, result)
            }
            Err(e) => {
                warn!("Unreadable descriptor {}: {}", next.path.display(), e);
                let result = JobResult::failure(format!("Invalid request descriptor: {}", e))
                    .with_request_id(next.job_id.as_str())
                    .with_field("executed_by", json!(self.executed_by));
                (self.layout.result_path(&next.job_id), result)
            }
        };

        if let Some(parent) = result_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Cannot create result directory {}: {}", parent.display(), e);
            }
        }
        match publish_result(&result_path, &result).await {
            Ok(true) => {}
            // Written files are final; this is the caller's timeout record
            Ok(false) => warn!(
                "Result for job {} already exists, discarding late result",
                next.job_id
            ),
            Err(e) => error!("Failed to write result for job {}: {}", next.job_id, e),
        }

        // Descriptor goes last so a crash before this point leaves the job visible
        if let Err(e) = self.queue.remove(&next.path).await {
            error!("Failed to remove descriptor {}: {}", next.path.display(), e);
        }

        Ok(Some(next.job_id))
    }

    /// Run one job and build its result. Never fails; every problem becomes
    /// a failure result.
    pub async fn execute_job(&mut self, request: &JobRequest) -> JobResult {
        let job_id = request.request_id.as_str();
        let started = Instant::now();
        debug!(
            "Executing job {} (queued for {:.2}s)",
            job_id,
            request.age().as_secs_f64()
        );

        let result = match tokio::fs::read(&request.script_path).await {
            Ok(script) => {
                let run = self.engine.execute(&script, &mut self.context);
                match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(Ok(Some(fields))) => JobResult::from_map(fields),
                    Ok(Ok(None)) => JobResult::success(Map::new())
                        .with_field("message", json!(DEFAULT_SUCCESS_MESSAGE)),
                    Ok(Err(e)) => {
                        let traceback = e.traceback().map(str::to_string);
                        failure_with_environment(&request.script_path, e.to_string(), traceback)
                            .await
                    }
                    Err(panic) => {
                        let panic = panic_message(panic);
                        let message = format!("Engine panicked: {}", panic);
                        let traceback = format!(
                            "{} engine panicked while running job {}: {}",
                            self.engine.name(),
                            job_id,
                            panic
                        );
                        failure_with_environment(&request.script_path, message, Some(traceback))
                            .await
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let message = format!("Script file not found: {}", request.script_path.display());
                failure_with_environment(&request.script_path, message, None).await
            }
            Err(e) => {
                let error = ScriptError::Io(e);
                let message = format!(
                    "Cannot read script {}: {}",
                    request.script_path.display(),
                    error
                );
                failure_with_environment(&request.script_path, message, None).await
            }
        };

        let result = result
            .with_request_id(job_id)
            .with_field("executed_by", json!(self.executed_by));
        self.context.record_outcome(result.success);

        if result.success {
            info!("Job {} succeeded in {:?}", job_id, started.elapsed());
        } else {
            warn!(
                "Job {} failed in {:?}: {}",
                job_id,
                started.elapsed(),
                result.error.as_deref().unwrap_or_default()
            );
        }
        result
    }

    /// Release the context through the engine
    pub async fn cleanup(&mut self) {
        if let Err(e) = self.engine.cleanup(&mut self.context).await {
            error!("Engine cleanup failed: {}", e);
        }
    }

    /// Scanning loop. Stops between jobs once `shutdown` turns true and
    /// hands the executor back for cleanup.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        snapshot: watch::Sender<ContextSnapshot>,
        scan_interval: Duration,
    ) -> Self {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next().await {
                Ok(Some(_)) => {
                    snapshot.send_replace(self.context.snapshot());
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("Request scan failed: {}", e),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(scan_interval) => {}
            }
        }

        debug!("Job scanner stopped after {} jobs", self.context.jobs_executed);
        self
    }
}

async fn failure_with_environment(
    script_path: &Path,
    message: String,
    traceback: Option<String>,
) -> JobResult {
    let script_exists = tokio::fs::try_exists(script_path).await.unwrap_or(false);
    let current_dir = std::env::current_dir()
        .map(|d| d.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut result = JobResult::failure(message).with_field(
        "environment",
        json!({
            "current_dir": current_dir,
            "script_path": script_path.to_string_lossy(),
            "script_exists": script_exists,
        }),
    );
    if let Some(traceback) = traceback {
        result = result.with_traceback(traceback);
    }
    result
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Worker orchestrating initialisation, the scanning loop and the main loop
pub struct JobWorker {
    config: WorkerConfig,
    layout: Layout,
    status: StatusChannel,
    signal: TerminationSignal,
    executor: JobExecutor,
}

impl JobWorker {
    pub fn new(config: WorkerConfig, layout: Layout, engine: Box<dyn ScriptEngine>) -> Self {
        Self {
            status: StatusChannel::new(&layout),
            signal: TerminationSignal::new(&layout),
            executor: JobExecutor::new(layout.clone(), engine),
            config,
            layout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Publish `starting`, initialise the engine, then publish
    /// `initialized` or `error`.
    pub async fn initialize(&mut self) -> Result<(), WorkerError> {
        self.layout.ensure_dirs().await?;
        self.publish(EngineStatus::new(EngineState::Starting)).await;

        let policy = RetryPolicy::exponential(
            self.config.init_attempts,
            self.config.init_retry_delay,
            INIT_RETRY_MAX_DELAY,
        );
        match self.executor.initialize_engine(&policy).await {
            Ok(()) => {
                let mut status = EngineStatus::new(EngineState::Initialized);
                status.system_available = Some(self.executor.context().system_available);
                self.publish(status).await;
                Ok(())
            }
            Err(e) => {
                self.publish(EngineStatus::error(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Run until the termination signal is observed
    pub async fn run(self) -> Result<(), WorkerError> {
        let JobWorker {
            config,
            status,
            signal,
            executor,
            ..
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(executor.context().snapshot());
        let mut scanner = tokio::spawn(executor.run(shutdown_rx, snapshot_tx, config.scan_interval));

        let mut tick = tokio::time::interval(config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_heartbeat: Option<Instant> = None;

        info!("Worker loop running");
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                joined = &mut scanner => {
                    // The scanner only returns on shutdown, so this is a crash
                    let message = match joined {
                        Ok(_) => "job scanner exited unexpectedly".to_string(),
                        Err(e) => format!("job scanner crashed: {}", e),
                    };
                    error!("{}", message);
                    publish_to(&status, EngineStatus::error(message.as_str())).await;
                    return Err(WorkerError::Scanner(message));
                }
            }

            match signal.consume().await {
                Ok(true) => {
                    info!("Termination signal received");
                    break;
                }
                Ok(false) => {}
                Err(e) => warn!("Cannot check termination signal: {}", e),
            }

            if last_heartbeat.map_or(true, |t| t.elapsed() >= config.heartbeat_interval) {
                let snapshot = snapshot_rx.borrow().clone();
                publish_to(&status, running_status(&snapshot)).await;
                last_heartbeat = Some(Instant::now());
            }
        }

        // The scanner finishes its current job before it observes this
        let _ = shutdown_tx.send(true);
        let mut executor = scanner
            .await
            .map_err(|e| WorkerError::Scanner(e.to_string()))?;

        executor.cleanup().await;

        let snapshot = executor.context().snapshot();
        let mut terminated = EngineStatus::new(EngineState::Terminated)
            .with_pid(Some(std::process::id()))
            .with_extra("jobs_executed", json!(snapshot.jobs_executed))
            .with_extra("jobs_failed", json!(snapshot.jobs_failed));
        terminated.system_available = Some(snapshot.system_available);
        publish_to(&status, terminated).await;

        info!(
            "Worker terminated after {} jobs ({} failed)",
            snapshot.jobs_executed, snapshot.jobs_failed
        );
        Ok(())
    }

    async fn publish(&self, status: EngineStatus) {
        publish_to(&self.status, status.with_pid(Some(std::process::id()))).await;
    }
}

fn running_status(snapshot: &ContextSnapshot) -> EngineStatus {
    let mut status = EngineStatus::new(EngineState::Running)
        .with_unit(snapshot.unit.clone())
        .with_pid(Some(std::process::id()))
        .with_extra("jobs_executed", json!(snapshot.jobs_executed))
        .with_extra("jobs_failed", json!(snapshot.jobs_failed));
    status.system_available = Some(snapshot.system_available);
    status
}

/// Status writes are best effort
async fn publish_to(channel: &StatusChannel, status: EngineStatus) {
    if let Err(e) = channel.write(&status).await {
        warn!("Failed to write {} status: {}", status.state, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepScriptEngine;
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tether_ipc::{read_result, write_result, ResultRead};

    struct PanicEngine;

    #[async_trait]
    impl ScriptEngine for PanicEngine {
        fn name(&self) -> &str {
            "panic"
        }

        async fn initialize(&mut self, _ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
            Ok(())
        }

        async fn execute(
            &mut self,
            script: &[u8],
            _ctx: &mut ExecutionContext,
        ) -> Result<Option<Map<String, JsonValue>>, ScriptError> {
            if script == b"panic" {
                panic!("engine blew up");
            }
            Ok(None)
        }

        async fn cleanup(&mut self, _ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    /// Fails initialisation a fixed number of times
    struct FlakyInitEngine {
        failures_left: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ScriptEngine for FlakyInitEngine {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ScriptError::Unavailable("system not ready".to_string()));
            }
            ctx.system_available = true;
            Ok(())
        }

        async fn execute(
            &mut self,
            _script: &[u8],
            _ctx: &mut ExecutionContext,
        ) -> Result<Option<Map<String, JsonValue>>, ScriptError> {
            Ok(None)
        }

        async fn cleanup(&mut self, _ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_millis(10),
            tick_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(20),
            init_attempts: 3,
            init_retry_delay: Duration::from_millis(5),
        }
    }

    async fn submit_raw(layout: &Layout, job_id: &str, payload: &[u8]) -> JobRequest {
        layout.ensure_dirs().await.unwrap();
        tokio::fs::create_dir_all(layout.job_dir(job_id)).await.unwrap();
        tokio::fs::write(layout.payload_path(job_id), payload)
            .await
            .unwrap();
        let request = JobRequest::new(
            job_id,
            layout.payload_path(job_id),
            layout.result_path(job_id),
        );
        RequestQueue::new(layout.clone())
            .enqueue(&request)
            .await
            .unwrap();
        request
    }

    async fn complete_result(path: &Path) -> JobResult {
        match read_result(path).await.unwrap() {
            ResultRead::Complete { result, .. } => result,
            other => panic!("expected a complete result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_next_writes_result_then_removes_descriptor() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));

        submit_raw(&layout, "job-1", br#"[{"op": "result", "value": 42}]"#).await;

        let processed = executor.process_next().await.unwrap();
        assert_eq!(processed.as_deref(), Some("job-1"));
        assert!(!layout.request_path("job-1").exists());

        let result = complete_result(&layout.result_path("job-1")).await;
        assert!(result.success);
        assert_eq!(result.get("value"), Some(&json!(42)));
        assert_eq!(result.request_id.as_deref(), Some("job-1"));
        assert!(result.get("executed_by").is_some());

        assert_eq!(executor.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_is_captured_with_diagnostics() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));

        let request = submit_raw(&layout, "job-2", br#"[{"op": "fail", "message": "boom"}]"#).await;
        let result = executor.execute_job(&request).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("boom"));
        assert!(result.traceback.is_some());
        assert_eq!(result.get("environment").unwrap()["script_exists"], json!(true));
        assert_eq!(executor.context().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_missing_payload_names_path() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));

        let request = submit_raw(&layout, "job-3", b"[]").await;
        tokio::fs::remove_file(&request.script_path).await.unwrap();

        let result = executor.execute_job(&request).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("Script file not found"));
        assert!(error.contains("payload.script"));
    }

    #[tokio::test]
    async fn test_no_result_synthesizes_success() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));

        let request = submit_raw(&layout, "job-4", b"[]").await;
        let result = executor.execute_job(&request).await;
        assert!(result.success);
        assert_eq!(result.get("message"), Some(&json!(DEFAULT_SUCCESS_MESSAGE)));
    }

    #[tokio::test]
    async fn test_existing_result_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));

        submit_raw(&layout, "late", br#"[{"op": "result", "value": 1}]"#).await;
        let timed_out = JobResult::failure("timed out").with_request_id("late");
        write_result(&layout.result_path("late"), &timed_out)
            .await
            .unwrap();

        executor.process_next().await.unwrap();

        let result = complete_result(&layout.result_path("late")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timed out"));
        assert!(!layout.request_path("late").exists());
    }

    #[tokio::test]
    async fn test_unreadable_descriptor_still_answered() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure_dirs().await.unwrap();
        tokio::fs::write(layout.request_path("broken"), b"{not json")
            .await
            .unwrap();

        let mut executor = JobExecutor::new(layout.clone(), Box::new(StepScriptEngine::new()));
        assert_eq!(executor.process_next().await.unwrap().as_deref(), Some("broken"));

        let result = complete_result(&layout.result_path("broken")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid request descriptor"));
        assert!(!layout.request_path("broken").exists());
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_and_executor_survives() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let mut executor = JobExecutor::new(layout.clone(), Box::new(PanicEngine));

        let request = submit_raw(&layout, "job-5", b"panic").await;
        let result = executor.execute_job(&request).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("engine blew up"));
        let traceback = result.traceback.expect("panic traceback");
        assert!(traceback.contains("job-5"));
        assert!(traceback.contains("engine blew up"));

        let request = submit_raw(&layout, "job-6", b"fine").await;
        assert!(executor.execute_job(&request).await.success);
        assert_eq!(executor.context().jobs_executed, 2);
    }

    #[tokio::test]
    async fn test_initialization_retries_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let calls = Arc::new(AtomicU32::new(0));
        let engine = FlakyInitEngine {
            failures_left: 2,
            calls: calls.clone(),
        };

        let mut worker = JobWorker::new(fast_config(), layout.clone(), Box::new(engine));
        worker.initialize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let status = StatusChannel::new(&layout).read().await.unwrap().unwrap();
        assert_eq!(status.state, EngineState::Initialized);
        assert_eq!(status.system_available, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialization_backs_off_exponentially() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let engine = FlakyInitEngine {
            failures_left: 3,
            calls: calls.clone(),
        };
        let mut executor = JobExecutor::new(Layout::new(dir.path()), Box::new(engine));

        let policy = RetryPolicy::exponential(4, Duration::from_millis(100), Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        executor.initialize_engine(&policy).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms between the four attempts
        assert!(started.elapsed() >= Duration::from_millis(700));
        assert!(executor.context().system_available);
    }

    #[tokio::test]
    async fn test_initialization_gives_up_with_error_status() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let engine = FlakyInitEngine {
            failures_left: 10,
            calls: Arc::new(AtomicU32::new(0)),
        };

        let mut worker = JobWorker::new(fast_config(), layout.clone(), Box::new(engine));
        let err = worker.initialize().await.unwrap_err();
        assert!(matches!(err, WorkerError::Initialization { attempts: 3, .. }));

        let status = StatusChannel::new(&layout).read().await.unwrap().unwrap();
        assert_eq!(status.state, EngineState::Error);
        assert!(status.error.unwrap().contains("system not ready"));
    }

    #[tokio::test]
    async fn test_worker_runs_jobs_until_terminated() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let units = dir.path().join("units");

        let mut worker = JobWorker::new(
            fast_config(),
            layout.clone(),
            Box::new(StepScriptEngine::with_base_dir(&units)),
        );
        worker.initialize().await.unwrap();
        let handle = tokio::spawn(worker.run());

        submit_raw(
            &layout,
            "job-a",
            br#"[{"op": "open", "path": "doc.json", "create": true},
                 {"op": "set", "key": "k", "value": "v"}]"#,
        )
        .await;

        let result_path = layout.result_path("job-a");
        for _ in 0..200 {
            if result_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(complete_result(&result_path).await.success);

        // Heartbeat reports the open unit
        let channel = StatusChannel::new(&layout);
        let mut saw_unit = false;
        for _ in 0..100 {
            if let Some(status) = channel.read().await.unwrap() {
                if status.state == EngineState::Running && status.unit.is_some() {
                    saw_unit = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(saw_unit);

        TerminationSignal::new(&layout).raise().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let status = channel.read().await.unwrap().unwrap();
        assert_eq!(status.state, EngineState::Terminated);
        assert!(!TerminationSignal::new(&layout).is_raised().await);

        // Cleanup saved the unit left dirty by the job
        let saved: JsonValue =
            serde_json::from_slice(&std::fs::read(units.join("doc.json")).unwrap()).unwrap();
        assert_eq!(saved["k"], json!("v"));
    }
}
