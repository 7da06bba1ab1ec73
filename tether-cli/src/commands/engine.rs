//! Commands that drive or inspect the engine: `exec`, `status`, `logs`

use anyhow::{Context, Result};
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use std::time::Duration;
use tether_config::TetherConfig;
use tether_execution::EngineSession;
use tracing::{info, warn};

pub async fn exec(config: &TetherConfig, payload: &Path, timeout: Option<u64>) -> Result<()> {
    let script = tokio::fs::read(payload)
        .await
        .with_context(|| format!("Failed to read payload {}", payload.display()))?;

    let session = EngineSession::new(config).context("Invalid engine configuration")?;
    session.start().await.context("Failed to start engine")?;

    let result = session
        .submit(script, timeout.map(Duration::from_secs))
        .await;

    if let Err(e) = session.shutdown(config.protocol.stale_job_age).await {
        warn!("Engine did not shut down cleanly: {}", e);
    }

    let formatted = serde_json::to_string_pretty(&result.to_json())
        .context("Failed to format result as JSON")?;
    println!("{}", formatted);

    if !result.success {
        anyhow::bail!(
            "Job failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    info!("Job completed");
    Ok(())
}

pub async fn status(config: &TetherConfig) -> Result<()> {
    let session = EngineSession::new(config).context("Invalid engine configuration")?;
    let status = session.status().await;

    let age = status.age();
    let mut report = serde_json::to_value(&status).context("Failed to encode status")?;
    if let JsonValue::Object(map) = &mut report {
        map.insert("age_seconds".to_string(), json!(age.as_secs_f64()));
        map.insert(
            "stale".to_string(),
            json!(status.is_stale(config.supervisor.status_stale_after)),
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to format status")?
    );
    Ok(())
}

pub async fn logs(config: &TetherConfig, lines: usize) -> Result<()> {
    let session = EngineSession::new(config).context("Invalid engine configuration")?;
    for line in session.logs(lines).await? {
        println!("{}", line);
    }
    Ok(())
}
