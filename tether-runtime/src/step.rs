//! Reference script engine driven by JSON step lists
//!
//! A payload is either `{"steps": [...]}` or a bare array of steps. Each step
//! is an object tagged by `op`:
//!
//! | op         | fields            | effect                                        |
//! |------------|-------------------|-----------------------------------------------|
//! | `open`     | `path`, `create`  | open a JSON document as the unit of work      |
//! | `set`      | `key`, `value`    | set a field on the open unit                  |
//! | `save`     |                   | write the unit back to disk                   |
//! | `close`    | `save` (true)     | close the unit, saving it first by default    |
//! | `var`      | `key`, `value`    | set a session variable                        |
//! | `sleep`    | `ms`              | pause                                         |
//! | `fail`     | `message`         | abort the payload with an error               |
//! | `result`   | `value`           | merge `value` into the job result             |
//! | `describe` |                   | report the unit, its fields and the variables |

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::{ExecutionContext, UnitOfWork};
use crate::engine::ScriptEngine;
use crate::error::ScriptError;

fn default_true() -> bool {
    true
}

/// One instruction of a step payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Open {
        path: PathBuf,
        #[serde(default)]
        create: bool,
    },
    Set {
        key: String,
        value: JsonValue,
    },
    Save,
    Close {
        #[serde(default = "default_true")]
        save: bool,
    },
    Var {
        key: String,
        value: JsonValue,
    },
    Sleep {
        ms: u64,
    },
    Fail {
        message: String,
    },
    Result {
        value: JsonValue,
    },
    Describe,
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Step::Open { .. } => "open",
            Step::Set { .. } => "set",
            Step::Save => "save",
            Step::Close { .. } => "close",
            Step::Var { .. } => "var",
            Step::Sleep { .. } => "sleep",
            Step::Fail { .. } => "fail",
            Step::Result { .. } => "result",
            Step::Describe => "describe",
        }
    }
}

/// Parse a step payload
pub fn parse_steps(script: &[u8]) -> Result<Vec<Step>, ScriptError> {
    let value: JsonValue = serde_json::from_slice(script)
        .map_err(|e| ScriptError::InvalidPayload(format!("payload is not JSON: {}", e)))?;

    let steps = match value {
        JsonValue::Array(_) => value,
        JsonValue::Object(mut obj) => obj.remove("steps").ok_or_else(|| {
            ScriptError::InvalidPayload("expected a 'steps' array".to_string())
        })?,
        _ => {
            return Err(ScriptError::InvalidPayload(
                "expected an array of steps".to_string(),
            ))
        }
    };

    serde_json::from_value(steps).map_err(|e| ScriptError::InvalidPayload(e.to_string()))
}

/// Engine that interprets step payloads against the execution context.
///
/// The unit of work is a JSON object stored on disk.
#[derive(Debug, Default)]
pub struct StepScriptEngine {
    /// Directory relative unit paths are resolved against
    base_dir: Option<PathBuf>,
}

impl StepScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    async fn open_unit(&self, path: &Path, create: bool) -> Result<UnitOfWork, ScriptError> {
        let path = self.resolve(path);
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(JsonValue::Object(map)) => map,
                Ok(_) => {
                    return Err(ScriptError::failed(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(ScriptError::failed(format!(
                        "cannot parse {}: {}",
                        path.display(),
                        e
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => Map::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScriptError::failed(format!(
                    "unit not found: {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let mut unit = UnitOfWork::new(path, data);
        unit.dirty = create && unit.data.is_empty();
        Ok(unit)
    }

    async fn save_unit(unit: &mut UnitOfWork) -> Result<(), ScriptError> {
        let bytes = serde_json::to_vec_pretty(&unit.data)
            .map_err(|e| ScriptError::failed(e.to_string()))?;
        if let Some(parent) = unit.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&unit.path, bytes).await?;
        unit.dirty = false;
        debug!("Saved unit {}", unit.path.display());
        Ok(())
    }

    fn open_unit_mut(ctx: &mut ExecutionContext) -> Result<&mut UnitOfWork, ScriptError> {
        ctx.unit
            .as_mut()
            .ok_or_else(|| ScriptError::failed("no unit of work is open"))
    }

    async fn run_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        result: &mut Option<Map<String, JsonValue>>,
    ) -> Result<(), ScriptError> {
        match step {
            Step::Open { path, create } => {
                if let Some(mut previous) = ctx.unit.take() {
                    if previous.dirty {
                        Self::save_unit(&mut previous).await?;
                    }
                }
                let unit = self.open_unit(path, *create).await?;
                info!("Opened unit {}", unit.path.display());
                ctx.unit = Some(unit);
            }
            Step::Set { key, value } => {
                let unit = Self::open_unit_mut(ctx)?;
                unit.data.insert(key.clone(), value.clone());
                unit.dirty = true;
            }
            Step::Save => {
                let unit = Self::open_unit_mut(ctx)?;
                Self::save_unit(unit).await?;
            }
            Step::Close { save } => {
                if let Some(mut unit) = ctx.unit.take() {
                    if *save && unit.dirty {
                        Self::save_unit(&mut unit).await?;
                    }
                    info!("Closed unit {}", unit.path.display());
                }
            }
            Step::Var { key, value } => {
                ctx.vars.insert(key.clone(), value.clone());
            }
            Step::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Step::Fail { message } => {
                return Err(ScriptError::failed(message.clone()));
            }
            Step::Result { value } => {
                let out = result.get_or_insert_with(Map::new);
                match value {
                    JsonValue::Object(fields) => {
                        out.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    other => {
                        out.insert("value".to_string(), other.clone());
                    }
                }
            }
            Step::Describe => {
                let out = result.get_or_insert_with(Map::new);
                out.insert("unit".to_string(), json!(ctx.unit_name()));
                out.insert(
                    "fields".to_string(),
                    ctx.unit
                        .as_ref()
                        .map(|u| JsonValue::Object(u.data.clone()))
                        .unwrap_or(JsonValue::Null),
                );
                out.insert("vars".to_string(), JsonValue::Object(ctx.vars.clone()));
                out.insert("jobs_executed".to_string(), json!(ctx.jobs_executed));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptEngine for StepScriptEngine {
    fn name(&self) -> &str {
        "step"
    }

    async fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
        if let Some(base) = &self.base_dir {
            tokio::fs::create_dir_all(base).await?;
        }
        ctx.system_available = true;
        Ok(())
    }

    async fn execute(
        &mut self,
        script: &[u8],
        ctx: &mut ExecutionContext,
    ) -> Result<Option<Map<String, JsonValue>>, ScriptError> {
        let steps = parse_steps(script)?;
        let mut result = None;

        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = self.run_step(step, ctx, &mut result).await {
                let traceback = format!("step {} ({}): {}", index + 1, step.op(), e);
                return Err(match e {
                    ScriptError::Failed { message, .. } => ScriptError::Failed {
                        message,
                        traceback: Some(traceback),
                    },
                    other => other,
                });
            }
        }

        Ok(result)
    }

    async fn cleanup(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError> {
        if let Some(mut unit) = ctx.unit.take() {
            if unit.dirty {
                warn!("Saving unsaved unit {} at shutdown", unit.path.display());
                Self::save_unit(&mut unit).await?;
            }
        }
        Ok(())
    }
}
