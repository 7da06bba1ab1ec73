//! Engine launch configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Placeholder substituted with the bootstrap script path at launch
pub const SCRIPT_PLACEHOLDER: &str = "{script}";

/// Placeholder substituted with the protocol root directory at launch
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// How the external engine process is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path (or PATH-resolvable name) of the engine executable
    pub executable: PathBuf,

    /// Launch arguments; `{script}` and `{root}` are substituted
    pub args: Vec<String>,

    /// Script the engine runs on launch to host the job worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_script: Option<PathBuf>,

    /// Working directory of the engine (defaults to the protocol root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Directory prepended to `library_path_var` in the engine environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,

    /// Name of the library search path variable
    pub library_path_var: String,

    /// Extra environment variables for the engine
    pub env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tether"),
            args: vec![
                "worker".to_string(),
                "--root".to_string(),
                ROOT_PLACEHOLDER.to_string(),
            ],
            bootstrap_script: None,
            working_dir: None,
            library_path: None,
            library_path_var: "PYTHONPATH".to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Whether any launch argument references the bootstrap script
    pub fn uses_bootstrap_script(&self) -> bool {
        self.args.iter().any(|arg| arg.contains(SCRIPT_PLACEHOLDER))
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(
            &self.executable.to_string_lossy(),
            "executable",
            self.domain_name(),
        )?;

        if self.library_path.is_some() {
            validate_required_string(&self.library_path_var, "library_path_var", self.domain_name())?;
        }

        if self.uses_bootstrap_script() && self.bootstrap_script.is_none() {
            return Err(self.validation_error(
                "args reference {script} but no bootstrap_script is configured",
            ));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "engine"
    }
}
