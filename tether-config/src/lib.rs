//! Domain-driven configuration for tether
//!
//! Configuration is split by functional domain (engine launch, file protocol,
//! supervision, worker loop, logging, auth). Every domain has serde defaults,
//! validation, and a small set of `TETHER_*` environment overrides.

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    auth::AuthConfig,
    engine::EngineConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    protocol::{PollStageConfig, ProtocolConfig},
    supervisor::SupervisorConfig,
    worker::WorkerConfig,
    TetherConfig,
};

pub use domains::utils::{serde_duration, serde_duration_ms};
