//! Mutable state shared by consecutive jobs inside one engine process

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;

/// A document opened by a job and kept open for later jobs
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub path: PathBuf,
    pub data: Map<String, JsonValue>,
    /// Modified since last save
    pub dirty: bool,
    pub opened_at: DateTime<Utc>,
}

impl UnitOfWork {
    pub fn new(path: PathBuf, data: Map<String, JsonValue>) -> Self {
        Self {
            path,
            data,
            dirty: false,
            opened_at: Utc::now(),
        }
    }

    pub fn name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Execution context owned exclusively by the job executor.
///
/// Exactly one exists per engine process and it is never persisted.
#[derive(Debug)]
pub struct ExecutionContext {
    pub unit: Option<UnitOfWork>,
    /// Session variables set by payloads
    pub vars: Map<String, JsonValue>,
    pub system_available: bool,
    pub jobs_executed: u64,
    pub jobs_failed: u64,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            unit: None,
            vars: Map::new(),
            system_available: false,
            jobs_executed: 0,
            jobs_failed: 0,
            started_at: Utc::now(),
        }
    }

    pub fn unit_name(&self) -> Option<String> {
        self.unit.as_ref().map(UnitOfWork::name)
    }

    pub fn record_outcome(&mut self, success: bool) {
        self.jobs_executed += 1;
        if !success {
            self.jobs_failed += 1;
        }
    }

    /// Copy of the fields the heartbeat reports
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            unit: self.unit_name(),
            system_available: self.system_available,
            jobs_executed: self.jobs_executed,
            jobs_failed: self.jobs_failed,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What the main loop may know about the context
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub unit: Option<String>,
    pub system_available: bool,
    pub jobs_executed: u64,
    pub jobs_failed: u64,
}
