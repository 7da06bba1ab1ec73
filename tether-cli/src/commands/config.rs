//! `tether config`

use anyhow::{Context, Result};
use std::path::PathBuf;
use tether_config::{ConfigLoader, TetherConfig};

use crate::cli::ConfigCommands;

pub fn handle(
    cmd: ConfigCommands,
    effective: &TetherConfig,
    global_path: Option<&PathBuf>,
) -> Result<()> {
    match cmd {
        ConfigCommands::Validate { config_file } => {
            let path = config_file
                .or_else(|| global_path.cloned())
                .context("No configuration file given; use --config-file or --config")?;
            ConfigLoader::new()
                .from_file(&path)
                .with_context(|| format!("{} is invalid", path.display()))?;
            println!("✅ {} is valid", path.display());
            Ok(())
        }
        ConfigCommands::Generate { output, force } => {
            let sample = TetherConfig::generate_sample();
            match output {
                Some(path) => {
                    if path.exists() && !force {
                        anyhow::bail!(
                            "{} already exists; use --force to overwrite",
                            path.display()
                        );
                    }
                    std::fs::write(&path, sample)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Sample configuration written to {}", path.display());
                }
                None => print!("{}", sample),
            }
            Ok(())
        }
        ConfigCommands::Show => {
            let yaml =
                serde_yaml::to_string(effective).context("Failed to render configuration")?;
            print!("{}", yaml);
            Ok(())
        }
    }
}
