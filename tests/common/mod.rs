//! Shared fixtures: an engine "process" hosted on the test runtime and fast
//! timing configuration.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use tether_config::{SupervisorConfig, TetherConfig, WorkerConfig};
use tether_execution::process::ROOT_ENV_VAR;
use tether_execution::{
    EngineProcess, EngineSession, ExecutionResult, LaunchSpec, ProcessExit, ProcessLauncher,
};
use tether_ipc::Layout;
use tether_runtime::{
    worker_main, ExecutionContext, ScriptEngine, ScriptError, StepScriptEngine, WorkerError,
};

pub fn init_test_logging() {
    let _ = tether_logging::init_simple_tracing("debug");
}

/// Configuration with timings short enough for tests
pub fn fast_config(root: &Path) -> TetherConfig {
    let mut config = TetherConfig::default();
    config.protocol.root_dir = root.to_path_buf();
    config.supervisor = SupervisorConfig {
        start_timeout: Duration::from_secs(5),
        start_poll_interval: Duration::from_millis(20),
        graceful_stop_timeout: Duration::from_secs(3),
        terminate_timeout: Duration::from_millis(500),
        kill_timeout: Duration::from_secs(2),
        stop_poll_interval: Duration::from_millis(20),
        restart_delay: Duration::from_millis(50),
        status_stale_after: Duration::from_secs(5),
    };
    config.worker = WorkerConfig {
        scan_interval: Duration::from_millis(10),
        tick_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(50),
        init_attempts: 2,
        init_retry_delay: Duration::from_millis(10),
    };
    config
}

/// Counts how many payloads run at the same time
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    executed: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

/// Step engine that records overlapping executions
pub struct InstrumentedEngine {
    inner: StepScriptEngine,
    probe: Arc<ConcurrencyProbe>,
}

impl InstrumentedEngine {
    pub fn new(probe: Arc<ConcurrencyProbe>) -> Self {
        Self {
            inner: StepScriptEngine::new(),
            probe,
        }
    }
}

#[async_trait]
impl ScriptEngine for InstrumentedEngine {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
        self.inner.initialize(ctx).await
    }

    async fn execute(
        &mut self,
        script: &[u8],
        ctx: &mut ExecutionContext,
    ) -> Result<Option<Map<String, JsonValue>>, ScriptError> {
        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now, Ordering::SeqCst);
        let outcome = self.inner.execute(script, ctx).await;
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        self.probe.executed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn cleanup(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
        self.inner.cleanup(ctx).await
    }
}

type EngineFactory = Arc<dyn Fn() -> Box<dyn ScriptEngine> + Send + Sync>;

/// Launcher that runs the worker as a task on the test runtime instead of
/// spawning an OS process
pub struct InProcessLauncher {
    worker: WorkerConfig,
    factory: EngineFactory,
    launches: AtomicU32,
}

impl InProcessLauncher {
    pub fn new(worker: WorkerConfig) -> Self {
        Self::with_engine(worker, || Box::new(StepScriptEngine::new()))
    }

    pub fn with_engine<F>(worker: WorkerConfig, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ScriptEngine> + Send + Sync + 'static,
    {
        Self {
            worker,
            factory: Arc::new(factory),
            launches: AtomicU32::new(0),
        }
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

fn root_of(spec: &LaunchSpec) -> PathBuf {
    spec.env
        .iter()
        .find(|(key, _)| key == ROOT_ENV_VAR)
        .map(|(_, value)| PathBuf::from(value))
        .unwrap_or_else(|| spec.working_dir.clone())
}

#[async_trait]
impl ProcessLauncher for InProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> ExecutionResult<Box<dyn EngineProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let layout = Layout::new(root_of(spec));
        let handle = tokio::spawn(worker_main(self.worker.clone(), layout, (self.factory)()));
        Ok(Box::new(InProcessEngine { handle }))
    }
}

/// Worker task standing in for the engine process
pub struct InProcessEngine {
    handle: JoinHandle<Result<(), WorkerError>>,
}

#[async_trait]
impl EngineProcess for InProcessEngine {
    fn id(&self) -> Option<u32> {
        Some(std::process::id())
    }

    fn try_exited(&mut self) -> ExecutionResult<Option<ProcessExit>> {
        Ok(self
            .handle
            .is_finished()
            .then_some(ProcessExit { code: Some(0) }))
    }

    async fn terminate(&mut self) -> ExecutionResult<()> {
        self.handle.abort();
        Ok(())
    }

    async fn kill(&mut self) -> ExecutionResult<()> {
        self.handle.abort();
        Ok(())
    }

    fn stderr_tail(&self) -> String {
        String::new()
    }
}

/// A started session backed by an in-process worker
pub struct TestEngine {
    pub dir: TempDir,
    pub config: TetherConfig,
    pub launcher: Arc<InProcessLauncher>,
    pub session: EngineSession,
}

impl TestEngine {
    pub async fn start() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let config = fast_config(dir.path());
        let launcher = Arc::new(InProcessLauncher::new(config.worker.clone()));
        Self::start_with(dir, config, launcher).await
    }

    pub async fn start_with(
        dir: TempDir,
        config: TetherConfig,
        launcher: Arc<InProcessLauncher>,
    ) -> Self {
        init_test_logging();
        let session = EngineSession::with_launcher(&config, launcher.clone())
            .expect("valid configuration");
        session.start().await.expect("engine starts");
        session
            .supervisor()
            .wait_ready(Duration::from_secs(5))
            .await
            .expect("engine ready");
        Self {
            dir,
            config,
            launcher,
            session,
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.dir.path())
    }
}

/// Names of the entries in `dir`, empty if it does not exist
pub fn entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
