//! API key configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Key file; relative paths resolve against the protocol root
    pub api_key_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_file: PathBuf::from("api_keys.json"),
        }
    }
}

impl AuthConfig {
    /// Resolve the key file path against `root`
    pub fn key_file_under(&self, root: &Path) -> PathBuf {
        if self.api_key_file.is_absolute() {
            self.api_key_file.clone()
        } else {
            root.join(&self.api_key_file)
        }
    }
}

impl Validatable for AuthConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.api_key_file.as_os_str().is_empty() {
            return Err(self.validation_error("api_key_file cannot be empty"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_resolution() {
        let config = AuthConfig::default();
        assert_eq!(
            config.key_file_under(Path::new("/srv/tether")),
            PathBuf::from("/srv/tether/api_keys.json")
        );

        let absolute = AuthConfig {
            api_key_file: PathBuf::from("/etc/tether/keys.json"),
        };
        assert_eq!(
            absolute.key_file_under(Path::new("/srv/tether")),
            PathBuf::from("/etc/tether/keys.json")
        );
    }
}
