//! `tether keys`

use anyhow::{Context, Result};
use tether_config::TetherConfig;
use tether_execution::ApiKeyStore;

use crate::cli::KeysCommands;

pub async fn handle(cmd: KeysCommands, config: &TetherConfig) -> Result<()> {
    let path = config.auth.key_file_under(&config.protocol.root_dir);
    let mut store = ApiKeyStore::open(&path)
        .await
        .with_context(|| format!("Failed to open key file {}", path.display()))?;

    match cmd {
        KeysCommands::Check { key } => match store.get(&key) {
            Some(entry) => {
                println!("valid ({})", entry.name);
                Ok(())
            }
            None => anyhow::bail!("invalid key"),
        },
        KeysCommands::Add { key, name } => {
            store.add(key, name).await?;
            println!("{} keys in {}", store.len(), path.display());
            Ok(())
        }
    }
}
