//! Domain-specific configuration modules

pub mod auth;
pub mod engine;
pub mod logging;
pub mod protocol;
pub mod supervisor;
pub mod utils;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main tether configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TetherConfig {
    /// How the engine process is launched
    pub engine: engine::EngineConfig,

    /// File protocol shared by client and worker
    pub protocol: protocol::ProtocolConfig,

    /// Engine process supervision timing
    pub supervisor: supervisor::SupervisorConfig,

    /// Engine-side worker loop
    pub worker: worker::WorkerConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,

    /// API key storage
    pub auth: auth::AuthConfig,
}

impl TetherConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.protocol.validate()?;
        self.supervisor.validate()?;
        self.worker.validate()?;
        self.logging.validate()?;
        self.auth.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TetherConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
