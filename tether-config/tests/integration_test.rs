//! Integration tests for tether-config

use std::path::PathBuf;
use std::time::Duration;
use temp_env::with_vars;
use tether_config::*;

#[test]
fn test_default_config_validation() {
    let config = TetherConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("TETHER_ROOT_DIR", Some("/srv/tether")),
        ("TETHER_ENGINE_EXECUTABLE", Some("/opt/engine/bin/engine")),
        ("TETHER_JOB_TIMEOUT_SECONDS", Some("45")),
        ("TETHER_LOG_LEVEL", Some("debug")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.protocol.root_dir, PathBuf::from("/srv/tether"));
        assert_eq!(config.engine.executable, PathBuf::from("/opt/engine/bin/engine"));
        assert_eq!(config.protocol.default_job_timeout, Duration::from_secs(45));
        assert_eq!(config.logging.level, LogLevel::Debug);
    });
}

#[test]
fn test_invalid_env_value_is_reported() {
    with_vars(vec![("TETHER_START_TIMEOUT_SECONDS", Some("soon"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
        assert!(err.to_string().contains("START_TIMEOUT_SECONDS"));
    });
}

#[test]
fn test_yaml_config_serialization() {
    let yaml = TetherConfig::generate_sample();
    let parsed: TetherConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.protocol.poll_stages, TetherConfig::default().protocol.poll_stages);
}

#[test]
fn test_comprehensive_config_file() {
    let yaml = r#"
engine:
  executable: /opt/engine/engine.exe
  args:
    - "--runscript={script}"
  bootstrap_script: /opt/tether/bootstrap.py
  library_path: /opt/tether/lib
  env:
    ENGINE_PROFILE: automation

protocol:
  root_dir: /var/lib/tether
  default_job_timeout: 120
  poll_stages:
    - until_ms: 2000
      interval_ms: 50
    - interval_ms: 750
  result_read_attempts: 8
  result_read_retry_delay_ms: 25

supervisor:
  start_timeout: 60
  start_poll_interval_ms: 1000
  graceful_stop_timeout: 15

worker:
  heartbeat_interval_ms: 2000

logging:
  level: warn
  format: json
"#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tether.yaml");
    std::fs::write(&path, yaml).unwrap();

    let config = ConfigLoader::with_prefix("TETHER_TEST_UNUSED")
        .from_file(&path)
        .unwrap();

    assert!(config.engine.uses_bootstrap_script());
    assert_eq!(config.engine.env.get("ENGINE_PROFILE").map(String::as_str), Some("automation"));
    assert_eq!(config.protocol.default_job_timeout, Duration::from_secs(120));
    assert_eq!(config.protocol.poll_stages.len(), 2);
    assert_eq!(config.protocol.poll_stages[0].interval, Duration::from_millis(50));
    assert_eq!(config.protocol.poll_stages[1].until, None);
    assert_eq!(config.protocol.result_read_retry_delay, Duration::from_millis(25));
    assert_eq!(config.supervisor.start_timeout, Duration::from_secs(60));
    // untouched fields keep their defaults
    assert_eq!(config.supervisor.kill_timeout, Duration::from_secs(5));
    assert_eq!(config.worker.heartbeat_interval, Duration::from_secs(2));
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_missing_bootstrap_script_fails_validation() {
    let yaml = r#"
engine:
  executable: engine
  args: ["--runscript={script}"]
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tether.yaml");
    std::fs::write(&path, yaml).unwrap();

    let err = ConfigLoader::with_prefix("TETHER_TEST_UNUSED")
        .from_file(&path)
        .unwrap_err();
    assert!(matches!(err, ConfigError::DomainError { ref domain, .. } if domain == "engine"));
}
