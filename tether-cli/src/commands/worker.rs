//! `tether worker`

use anyhow::{Context, Result};
use tether_config::TetherConfig;
use tether_ipc::Layout;
use tether_runtime::{worker_main, StepScriptEngine};

pub async fn run(config: &TetherConfig, layout: Layout) -> Result<()> {
    tracing::info!("Worker starting in {}", layout.root().display());
    worker_main(
        config.worker.clone(),
        layout,
        Box::new(StepScriptEngine::new()),
    )
    .await
    .context("Worker failed")
}
