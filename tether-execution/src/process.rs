//! Engine process launching behind a small, fakeable interface

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tether_config::domains::engine::{ROOT_PLACEHOLDER, SCRIPT_PLACEHOLDER};
use tether_config::EngineConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, ExecutionResult};

/// Environment variable through which the engine learns the protocol root
pub const ROOT_ENV_VAR: &str = "TETHER_ROOT";

/// Lines of engine stderr kept for startup diagnostics
const STDERR_TAIL_LINES: usize = 50;

/// Everything needed to spawn the engine
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub bootstrap_script: Option<PathBuf>,
}

impl LaunchSpec {
    /// Resolve placeholders and environment for an engine rooted at `root`
    pub fn from_config(engine: &EngineConfig, root: &Path) -> Self {
        let script = engine
            .bootstrap_script
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root_str = root.to_string_lossy();

        let args = engine
            .args
            .iter()
            .map(|arg| {
                arg.replace(SCRIPT_PLACEHOLDER, &script)
                    .replace(ROOT_PLACEHOLDER, &root_str)
            })
            .collect();

        let mut env: Vec<(String, String)> = engine
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.push((ROOT_ENV_VAR.to_string(), root_str.to_string()));

        if let Some(library_path) = &engine.library_path {
            let mut paths = vec![library_path.clone()];
            if let Some(inherited) = std::env::var_os(&engine.library_path_var) {
                paths.extend(std::env::split_paths(&inherited));
            }
            let joined = std::env::join_paths(paths)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| library_path.to_string_lossy().into_owned());
            env.push((engine.library_path_var.clone(), joined));
        }

        Self {
            program: engine.executable.clone(),
            args,
            working_dir: engine
                .working_dir
                .clone()
                .unwrap_or_else(|| root.to_path_buf()),
            env,
            bootstrap_script: engine
                .bootstrap_script
                .clone()
                .filter(|_| engine.uses_bootstrap_script()),
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A running engine process
#[async_trait]
pub trait EngineProcess: Send + Sync {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_exited(&mut self) -> ExecutionResult<Option<ProcessExit>>;

    /// Ask the process to terminate (SIGTERM on Unix)
    async fn terminate(&mut self) -> ExecutionResult<()>;

    /// Forcibly kill the process; does not wait for it to be reaped
    async fn kill(&mut self) -> ExecutionResult<()>;

    /// Most recent error output, for diagnostics
    fn stderr_tail(&self) -> String;
}

/// Spawns engine processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> ExecutionResult<Box<dyn EngineProcess>>;
}

/// Launcher backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> ExecutionResult<Box<dyn EngineProcess>> {
        let program = locate_program(&spec.program).ok_or_else(|| {
            ExecutionError::ProcessLaunch(format!(
                "Engine executable not found: {}",
                spec.program.display()
            ))
        })?;

        debug!("Spawning {} {:?} in {}", program.display(), spec.args, spec.working_dir.display());

        let mut child = Command::new(&program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::ProcessLaunch(format!("Failed to spawn {}: {}", program.display(), e))
            })?;

        let stderr = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(pipe) = child.stderr.take() {
            let sink = Arc::clone(&stderr);
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(mut buffer) = sink.lock() {
                        if buffer.len() == STDERR_TAIL_LINES {
                            buffer.pop_front();
                        }
                        buffer.push_back(line);
                    }
                }
            });
        }

        info!("Engine process spawned with pid {:?}", child.id());
        Ok(Box::new(TokioEngineProcess {
            pid: child.id(),
            child,
            stderr,
        }))
    }
}

/// Engine process spawned by [`TokioProcessLauncher`]
pub struct TokioEngineProcess {
    pid: Option<u32>,
    child: Child,
    stderr: Arc<Mutex<VecDeque<String>>>,
}

#[async_trait]
impl EngineProcess for TokioEngineProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn try_exited(&mut self) -> ExecutionResult<Option<ProcessExit>> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| ProcessExit { code: s.code() }))
            .map_err(|e| ExecutionError::ProcessTermination(format!("Failed to poll engine: {}", e)))
    }

    async fn terminate(&mut self) -> ExecutionResult<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                return signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
                    ExecutionError::ProcessTermination(format!("Failed to send SIGTERM to {}: {}", pid, e))
                });
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            // No graceful signal available; fall back to the hard kill
            warn!("Graceful terminate unsupported on this platform, killing engine");
            self.kill().await
        }
    }

    async fn kill(&mut self) -> ExecutionResult<()> {
        self.child
            .start_kill()
            .map_err(|e| ExecutionError::ProcessTermination(format!("Failed to kill engine: {}", e)))
    }

    fn stderr_tail(&self) -> String {
        match self.stderr.lock() {
            Ok(buffer) => buffer.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => {
                warn!("Engine stderr buffer poisoned");
                String::new()
            }
        }
    }
}

/// Resolve a program path, searching `PATH` for bare names
fn locate_program(program: &Path) -> Option<PathBuf> {
    if program.is_absolute() || program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .flat_map(|dir| {
            let candidate = dir.join(program);
            let exe = candidate.with_extension(std::env::consts::EXE_EXTENSION);
            [candidate, exe]
        })
        .find(|candidate| candidate.is_file())
}
