//! Wire types of the file protocol

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Error text used when a failed result carries no description
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Current time as fractional seconds since the Unix epoch
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Request descriptor placed in the request directory.
///
/// The payload itself lives out of band at `script_path`; the descriptor
/// only references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub script_path: PathBuf,
    pub result_path: PathBuf,
    pub timestamp: f64,
    pub request_id: String,
}

impl JobRequest {
    pub fn new(request_id: impl Into<String>, script_path: PathBuf, result_path: PathBuf) -> Self {
        Self {
            script_path,
            result_path,
            timestamp: now_timestamp(),
            request_id: request_id.into(),
        }
    }

    /// Time elapsed since submission
    pub fn age(&self) -> Duration {
        age_of(self.timestamp)
    }
}

/// Structured outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Engine-defined result fields
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl JobResult {
    /// Create a successful result
    pub fn success(fields: Map<String, JsonValue>) -> Self {
        Self {
            success: true,
            error: None,
            traceback: None,
            request_id: None,
            fields,
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            traceback: None,
            request_id: None,
            fields: Map::new(),
        }
    }

    /// Build a result from an engine-produced map.
    ///
    /// Reserved keys are lifted out of the map; a missing `success` means
    /// the engine finished normally.
    pub fn from_map(mut fields: Map<String, JsonValue>) -> Self {
        let success = fields
            .remove("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let mut text = |key: &str| match fields.remove(key) {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let error = text("error");
        let traceback = text("traceback");
        let request_id = text("request_id");
        Self {
            success,
            error,
            traceback,
            request_id,
            fields,
        }
        .normalized()
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Enforce that exactly one of the success or failure paths is populated
    pub fn normalized(mut self) -> Self {
        if self.success {
            self.error = None;
        } else if self.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
            self.error = Some(UNKNOWN_ERROR.to_string());
        }
        self
    }

    /// Render the result as a flat JSON object
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "success": false, "error": e.to_string() })
        })
    }
}

/// Engine lifecycle state as reported through the status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Starting,
    Initialized,
    Running,
    Terminated,
    Error,
    /// Only synthesized by readers when no record exists
    Unknown,
}

impl EngineState {
    /// The engine accepts jobs in this state
    pub fn is_ready(self) -> bool {
        matches!(self, EngineState::Initialized | EngineState::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Terminated)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Starting => "starting",
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Terminated => "terminated",
            EngineState::Error => "error",
            EngineState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Liveness and lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub timestamp: f64,

    /// Identity of the active unit of work, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_available: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl EngineStatus {
    pub fn new(state: EngineState) -> Self {
        Self {
            state,
            timestamp: now_timestamp(),
            unit: None,
            system_available: None,
            error: None,
            pid: None,
            extra: Map::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(EngineState::Unknown)
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut status = Self::new(EngineState::Error);
        status.error = Some(message.into());
        status
    }

    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Time since the record was last refreshed
    pub fn age(&self) -> Duration {
        age_of(self.timestamp)
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }
}

fn age_of(timestamp: f64) -> Duration {
    let elapsed = now_timestamp() - timestamp;
    if elapsed.is_finite() && elapsed > 0.0 {
        Duration::from_secs_f64(elapsed)
    } else {
        Duration::ZERO
    }
}
