//! Engine lifecycle: idempotent start/stop, restart, readiness and forced
//! termination of an engine that ignores the termination signal.

mod common;

use common::{fast_config, init_test_logging, InProcessLauncher, TestEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tether_execution::EngineSession;
use tether_ipc::{EngineState, JobResult};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_and_stop_are_idempotent() {
    let engine = TestEngine::start().await;

    engine.session.start().await.unwrap();
    engine.session.start().await.unwrap();
    assert_eq!(engine.launcher.launches(), 1);

    engine.session.stop().await.unwrap();
    assert!(!engine.session.supervisor().is_running().await);
    engine.session.stop().await.unwrap();

    let status = engine.session.status().await;
    assert_eq!(status.state, EngineState::Terminated);
    assert!(!engine.layout().termination_signal_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_without_start_is_a_no_op() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let launcher = Arc::new(InProcessLauncher::new(config.worker.clone()));
    let session = EngineSession::with_launcher(&config, launcher.clone()).unwrap();

    session.stop().await.unwrap();
    assert_eq!(launcher.launches(), 0);
    assert_eq!(session.status().await.state, EngineState::Unknown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_refused_when_engine_not_running() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let launcher = Arc::new(InProcessLauncher::new(config.worker.clone()));
    let session = EngineSession::with_launcher(&config, launcher).unwrap();

    let result: JobResult = session.submit("[]", Some(Duration::from_secs(1))).await;
    assert!(!result.success);
    assert_eq!(
        result.get("error_kind"),
        Some(&serde_json::json!("unavailable"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_launches_fresh_worker() {
    let engine = TestEngine::start().await;

    engine.session.restart().await.unwrap();
    assert_eq!(engine.launcher.launches(), 2);
    engine
        .session
        .supervisor()
        .wait_ready(Duration::from_secs(5))
        .await
        .unwrap();

    let result = engine
        .session
        .submit(r#"[{"op": "result", "value": 1}]"#, Some(Duration::from_secs(5)))
        .await;
    assert!(result.success);

    let health = engine.session.health().await;
    assert!(health.process_running);
    assert!(health.is_alive());

    engine.session.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_info_reports_root_and_running_flag() {
    let engine = TestEngine::start().await;
    let info = engine.session.info().await;
    assert!(info.running);
    assert_eq!(info.root, engine.dir.path());
    engine.session.stop().await.unwrap();
    assert!(!engine.session.info().await.running);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_escalates_when_engine_ignores_signals() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.engine.executable = "sh".into();
    config.engine.args = vec![
        "-c".to_string(),
        "trap '' TERM; while true; do sleep 0.05; done".to_string(),
    ];
    config.supervisor.start_timeout = Duration::from_millis(300);
    config.supervisor.graceful_stop_timeout = Duration::from_millis(300);
    config.supervisor.terminate_timeout = Duration::from_millis(300);
    config.supervisor.kill_timeout = Duration::from_secs(2);

    let session = EngineSession::new(&config).unwrap();
    session.start().await.unwrap();
    assert!(session.supervisor().is_running().await);

    // Silent engine: readiness was synthesized
    let status = session.status().await;
    assert_eq!(status.state, EngineState::Initialized);

    let started = Instant::now();
    session.stop().await.unwrap();
    let budget = config.supervisor.graceful_stop_timeout
        + config.supervisor.terminate_timeout
        + config.supervisor.kill_timeout;
    assert!(started.elapsed() <= budget + Duration::from_millis(500));
    assert!(started.elapsed() >= config.supervisor.graceful_stop_timeout);
    assert!(!session.supervisor().is_running().await);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_exiting_during_startup_is_a_launch_error() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.engine.executable = "sh".into();
    config.engine.args = vec!["-c".to_string(), "echo missing license >&2; exit 3".to_string()];

    let session = EngineSession::new(&config).unwrap();
    let err = session.start().await.unwrap_err();
    assert_eq!(err.kind(), "process_launch");
    assert!(err.to_string().contains("exit code 3"));
}

#[tokio::test]
async fn test_missing_executable_is_a_launch_error() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.engine.executable = "definitely-not-an-engine-binary".into();

    let session = EngineSession::new(&config).unwrap();
    let err = session.start().await.unwrap_err();
    assert_eq!(err.kind(), "process_launch");
    assert!(!session.supervisor().is_running().await);
}
