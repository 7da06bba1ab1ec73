//! Script engine seam

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::context::ExecutionContext;
use crate::error::ScriptError;

/// Executes payloads against the execution context.
///
/// Only the job executor calls into an engine, one job at a time, so
/// implementations may freely mutate the context.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Short name stamped on results as `executed_by`
    fn name(&self) -> &str;

    /// Prepare the hosting system; retried by the worker on failure
    async fn initialize(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError>;

    /// Run one payload. `Ok(None)` means the payload produced no explicit result.
    async fn execute(
        &mut self,
        script: &[u8],
        ctx: &mut ExecutionContext,
    ) -> Result<Option<Map<String, JsonValue>>, ScriptError>;

    /// Release the context at shutdown, saving anything unsaved
    async fn cleanup(&mut self, ctx: &mut ExecutionContext) -> Result<(), ScriptError>;
}
