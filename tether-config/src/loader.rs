//! Configuration loading and environment variable handling

use crate::domains::TetherConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TETHER".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TetherConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: TetherConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TetherConfig> {
        let mut config = TetherConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TetherConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut TetherConfig) -> ConfigResult<()> {
        if let Ok(root) = self.get_env_var("ROOT_DIR") {
            config.protocol.root_dir = PathBuf::from(root);
        }

        if let Ok(executable) = self.get_env_var("ENGINE_EXECUTABLE") {
            config.engine.executable = PathBuf::from(executable);
        }

        if let Ok(script) = self.get_env_var("BOOTSTRAP_SCRIPT") {
            config.engine.bootstrap_script = Some(PathBuf::from(script));
        }

        if let Ok(timeout) = self.get_env_var("JOB_TIMEOUT_SECONDS") {
            config.protocol.default_job_timeout = parse_seconds("JOB_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(timeout) = self.get_env_var("START_TIMEOUT_SECONDS") {
            config.supervisor.start_timeout = parse_seconds("START_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_seconds(name: &str, value: &str) -> ConfigResult<Duration> {
    let seconds: u64 = value
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))?;
    Ok(Duration::from_secs(seconds))
}
