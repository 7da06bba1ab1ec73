//! Caller-facing engine session

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_config::TetherConfig;
use tether_ipc::{EngineStatus, JobResult, Layout};
use tracing::info;

use crate::client::JobClient;
use crate::error::{ExecutionError, ExecutionResult};
use crate::process::{LaunchSpec, ProcessLauncher, TokioProcessLauncher};
use crate::supervisor::{EngineHealth, ProcessSupervisor};

/// Static facts about the session
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub executable: PathBuf,
    pub bootstrap_script: Option<PathBuf>,
    pub root: PathBuf,
    pub running: bool,
    pub pid: Option<u32>,
}

/// The entire contract the request layer needs: lifecycle plus `submit`
pub struct EngineSession {
    supervisor: ProcessSupervisor,
    client: JobClient,
}

impl EngineSession {
    /// Session launching the engine with `tokio::process`
    pub fn new(config: &TetherConfig) -> ExecutionResult<Self> {
        Self::with_launcher(config, Arc::new(TokioProcessLauncher::new()))
    }

    pub fn with_launcher(
        config: &TetherConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> ExecutionResult<Self> {
        config.validate_all()?;
        let layout = Layout::new(&config.protocol.root_dir);
        let spec = LaunchSpec::from_config(&config.engine, layout.root());
        Ok(Self {
            supervisor: ProcessSupervisor::new(
                config.supervisor.clone(),
                layout.clone(),
                spec,
                launcher,
            ),
            client: JobClient::new(layout, &config.protocol),
        })
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn client(&self) -> &JobClient {
        &self.client
    }

    pub async fn start(&self) -> ExecutionResult<()> {
        self.supervisor.start().await
    }

    pub async fn stop(&self) -> ExecutionResult<()> {
        self.supervisor.stop().await
    }

    pub async fn restart(&self) -> ExecutionResult<()> {
        self.supervisor.restart().await
    }

    pub async fn status(&self) -> EngineStatus {
        self.supervisor.status().await
    }

    pub async fn health(&self) -> EngineHealth {
        self.supervisor.health().await
    }

    /// Run a payload; refuses immediately when the engine is not running
    pub async fn submit(&self, payload: impl AsRef<[u8]>, timeout: Option<Duration>) -> JobResult {
        if !self.supervisor.is_running().await {
            let err = ExecutionError::Unavailable("engine is not running".to_string());
            return JobResult::failure(err.to_string())
                .with_field("error_kind", serde_json::Value::from(err.kind()));
        }
        self.client.submit(payload, timeout).await
    }

    /// Last `lines` lines of the engine session log
    pub async fn logs(&self, lines: usize) -> ExecutionResult<Vec<String>> {
        let path = self.supervisor.layout().session_log_path();
        tether_logging::read_log_tail(&path, lines)
            .await
            .map_err(|e| ExecutionError::JobIo(format!("Failed to read {}: {}", path.display(), e)))
    }

    pub async fn info(&self) -> EngineInfo {
        let spec = self.supervisor.launch_spec();
        EngineInfo {
            executable: spec.program.clone(),
            bootstrap_script: spec.bootstrap_script.clone(),
            root: self.supervisor.layout().root().to_path_buf(),
            running: self.supervisor.is_running().await,
            pid: self.supervisor.pid().await,
        }
    }

    /// Stop the engine and remove orphaned job directories
    pub async fn shutdown(&self, stale_job_age: Duration) -> ExecutionResult<()> {
        self.stop().await?;
        let swept = self.client.sweep_stale_jobs(stale_job_age).await?;
        info!("Session shut down, {} stale jobs swept", swept);
        Ok(())
    }
}
