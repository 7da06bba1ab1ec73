//! Engine process supervision: start, readiness, health and escalating stop

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_config::{SupervisorConfig, TetherConfig};
use tether_ipc::{EngineState, EngineStatus, Layout, StatusChannel, TerminationSignal};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, ExecutionResult};
use crate::process::{EngineProcess, LaunchSpec, ProcessLauncher, TokioProcessLauncher};

/// Combined view of the OS process and the status channel
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub process_running: bool,
    pub status: EngineStatus,
    /// The record is missing or older than the staleness threshold
    pub stale: bool,
}

impl EngineHealth {
    /// A dead process with a stale or terminal record is not running,
    /// whatever state was last recorded
    pub fn is_alive(&self) -> bool {
        self.process_running || !(self.stale || self.status.state.is_terminal())
    }
}

/// Owns the engine's OS process handle
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    spec: LaunchSpec,
    layout: Layout,
    status: StatusChannel,
    signal: TerminationSignal,
    launcher: Arc<dyn ProcessLauncher>,
    process: Mutex<Option<Box<dyn EngineProcess>>>,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        layout: Layout,
        spec: LaunchSpec,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            status: StatusChannel::new(&layout),
            signal: TerminationSignal::new(&layout),
            config,
            spec,
            layout,
            launcher,
            process: Mutex::new(None),
        }
    }

    /// Supervisor for a real engine process described by `config`
    pub fn from_config(config: &TetherConfig) -> Self {
        let layout = Layout::new(&config.protocol.root_dir);
        let spec = LaunchSpec::from_config(&config.engine, layout.root());
        Self::new(
            config.supervisor.clone(),
            layout,
            spec,
            Arc::new(TokioProcessLauncher::new()),
        )
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn launch_spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Launch the engine and wait until it reports a status record.
    ///
    /// A no-op when the engine is already running. If no record appears
    /// within `start_timeout` but the process is alive, an `initialized`
    /// record is synthesized. An `error` record fails the start at once and
    /// the engine is shut down.
    pub async fn start(&self) -> ExecutionResult<()> {
        let mut guard = self.process.lock().await;

        if let Some(process) = guard.as_mut() {
            if process.try_exited()?.is_none() {
                debug!("Engine already running with pid {:?}", process.id());
                return Ok(());
            }
            *guard = None;
        }

        if let Some(script) = &self.spec.bootstrap_script {
            if !script.is_file() {
                return Err(ExecutionError::ProcessLaunch(format!(
                    "Bootstrap script not found: {}",
                    script.display()
                )));
            }
        }

        self.layout.ensure_dirs().await?;
        self.signal.clear().await?;
        self.status.clear().await?;

        info!("Starting engine {}", self.spec.program.display());
        let mut process = self.launcher.launch(&self.spec).await?;
        let started = Instant::now();

        loop {
            if let Some(exit) = process.try_exited()? {
                let mut detail = process.stderr_tail();
                if let Ok(Some(status)) = self.status.read().await {
                    if let Some(reported) = status.error {
                        detail = format!("{} {}", reported, detail);
                    }
                }
                error!("Engine exited during startup ({}): {}", exit, detail.trim());
                return Err(ExecutionError::ProcessLaunch(format!(
                    "Engine exited during startup ({}): {}",
                    exit,
                    detail.trim()
                )));
            }

            let record = match self.status.read().await {
                Ok(record) => record,
                Err(e) => {
                    debug!("Status record not readable yet: {}", e);
                    None
                }
            };
            if let Some(status) = record {
                if status.state == EngineState::Error {
                    let reported = status
                        .error
                        .unwrap_or_else(|| "no error detail".to_string());
                    error!("Engine reported an error during startup: {}", reported);
                    return self.abandon_start(guard, process, reported).await;
                }
                info!("Engine reported state {} after {:?}", status.state, started.elapsed());
                break;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.start_timeout {
                warn!(
                    "Engine alive but silent after {:?}; assuming initialized",
                    self.config.start_timeout
                );
                let synthesized = EngineStatus::new(EngineState::Initialized)
                    .with_pid(process.id())
                    .with_extra("synthesized", serde_json::Value::Bool(true));
                if let Err(e) = self.status.write(&synthesized).await {
                    warn!("Failed to write synthesized status: {}", e);
                }
                break;
            }

            sleep(self.config.start_poll_interval.min(self.config.start_timeout - elapsed)).await;
        }

        *guard = Some(process);
        Ok(())
    }

    /// Shut down an engine that failed during startup and report why.
    ///
    /// The handle is kept only if the process outlives the escalation.
    async fn abandon_start(
        &self,
        mut guard: tokio::sync::MutexGuard<'_, Option<Box<dyn EngineProcess>>>,
        mut process: Box<dyn EngineProcess>,
        reported: String,
    ) -> ExecutionResult<()> {
        let stopped = match process.try_exited() {
            Ok(Some(_)) => Ok(()),
            _ => self.escalate(process.as_mut()).await,
        };
        if let Err(e) = self.signal.clear().await {
            warn!("Failed to clear termination signal: {}", e);
        }
        if let Err(e) = stopped {
            warn!("Engine that failed to start could not be stopped: {}", e);
            *guard = Some(process);
        }
        Err(ExecutionError::ProcessLaunch(format!(
            "Engine reported an error during startup: {}",
            reported
        )))
    }

    /// Stop the engine: termination signal, then SIGTERM, then kill.
    ///
    /// Succeeds immediately when nothing is running. The termination signal
    /// file is always cleared afterwards.
    pub async fn stop(&self) -> ExecutionResult<()> {
        let mut guard = self.process.lock().await;
        let Some(mut process) = guard.take() else {
            return Ok(());
        };

        let outcome = match process.try_exited() {
            Ok(Some(_)) => Ok(()),
            _ => self.escalate(process.as_mut()).await,
        };

        if let Err(e) = self.signal.clear().await {
            warn!("Failed to clear termination signal: {}", e);
        }

        if let Err(e) = outcome {
            // Keep the handle so is_running() still reflects reality
            *guard = Some(process);
            return Err(e);
        }
        info!("Engine stopped");
        Ok(())
    }

    async fn escalate(&self, process: &mut dyn EngineProcess) -> ExecutionResult<()> {
        info!("Requesting cooperative shutdown of engine {:?}", process.id());
        if let Err(e) = self.signal.raise().await {
            warn!("Failed to write termination signal: {}", e);
        }
        if self
            .wait_for_exit(process, self.config.graceful_stop_timeout)
            .await?
        {
            return Ok(());
        }

        warn!("Engine ignored termination signal, sending terminate");
        if let Err(e) = process.terminate().await {
            warn!("Failed to terminate engine: {}", e);
        }
        if self
            .wait_for_exit(process, self.config.terminate_timeout)
            .await?
        {
            return Ok(());
        }

        warn!("Engine still alive, killing");
        process.kill().await?;
        if self.wait_for_exit(process, self.config.kill_timeout).await? {
            return Ok(());
        }

        error!("Engine did not terminate even after kill");
        Err(ExecutionError::ProcessTermination(format!(
            "engine {:?} unresponsive to kill",
            process.id()
        )))
    }

    async fn wait_for_exit(
        &self,
        process: &mut dyn EngineProcess,
        timeout: Duration,
    ) -> ExecutionResult<bool> {
        let started = Instant::now();
        loop {
            if let Some(exit) = process.try_exited()? {
                debug!("Engine exited with {}", exit);
                return Ok(true);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            sleep(self.config.stop_poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// True iff a tracked process exists and has not exited
    pub async fn is_running(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(process) => matches!(process.try_exited(), Ok(None)),
            None => false,
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|p| p.id())
    }

    /// Last status record, `unknown` if none, `error` if unreadable
    pub async fn status(&self) -> EngineStatus {
        match self.status.read().await {
            Ok(Some(status)) => status,
            Ok(None) => EngineStatus::unknown(),
            Err(e) => EngineStatus::error(format!("Failed to read status: {}", e)),
        }
    }

    pub async fn health(&self) -> EngineHealth {
        let process_running = self.is_running().await;
        let status = self.status().await;
        let stale = status.state == EngineState::Unknown
            || status.is_stale(self.config.status_stale_after);
        EngineHealth {
            process_running,
            status,
            stale,
        }
    }

    /// Wait until the engine reports `initialized` or `running`
    pub async fn wait_ready(&self, timeout: Duration) -> ExecutionResult<EngineStatus> {
        let started = Instant::now();
        loop {
            if !self.is_running().await {
                return Err(ExecutionError::Unavailable("engine is not running".to_string()));
            }
            let status = self.status().await;
            if status.state.is_ready() {
                return Ok(status);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ExecutionError::Unavailable(format!(
                    "engine still {} after {:?}",
                    status.state, timeout
                )));
            }
            sleep(self.config.start_poll_interval.min(timeout - elapsed)).await;
        }
    }

    pub async fn restart(&self) -> ExecutionResult<()> {
        info!("Restarting engine");
        self.stop().await?;
        sleep(self.config.restart_delay).await;
        self.start().await
    }

    /// Path of the bootstrap script, when launch arguments use one
    pub fn bootstrap_script(&self) -> Option<&Path> {
        self.spec.bootstrap_script.as_deref()
    }
}
