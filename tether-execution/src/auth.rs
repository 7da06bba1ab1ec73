//! API key store consulted by the request layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tether_ipc::write_atomic;
use tracing::{info, warn};

use crate::error::{ExecutionError, ExecutionResult};

/// Key created when no key file exists yet
pub const DEFAULT_ADMIN_KEY: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// File-backed map of API keys
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    path: PathBuf,
    keys: BTreeMap<String, ApiKeyEntry>,
}

impl ApiKeyStore {
    /// Load the key file, creating it with a default admin key when missing.
    ///
    /// An unreadable or corrupt file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> ExecutionResult<Self> {
        let path = path.into();
        let keys = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!("Ignoring unreadable key file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let store = Self {
                    keys: BTreeMap::from([(
                        DEFAULT_ADMIN_KEY.to_string(),
                        ApiKeyEntry {
                            name: "Admin".to_string(),
                            permissions: vec!["all".to_string()],
                        },
                    )]),
                    path,
                };
                store.save().await?;
                info!("Created key file {} with default admin key", store.path.display());
                return Ok(store);
            }
            Err(e) => {
                warn!("Cannot read key file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Ok(Self { path, keys })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn validate(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ApiKeyEntry> {
        self.keys.get(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add or replace a key and persist the store
    pub async fn add(&mut self, key: impl Into<String>, name: impl Into<String>) -> ExecutionResult<()> {
        self.keys.insert(
            key.into(),
            ApiKeyEntry {
                name: name.into(),
                permissions: Vec::new(),
            },
        );
        self.save().await
    }

    async fn save(&self) -> ExecutionResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecutionError::Configuration(format!("{}: {}", parent.display(), e)))?;
        }
        let body = serde_json::to_vec_pretty(&self.keys)
            .map_err(|e| ExecutionError::Configuration(e.to_string()))?;
        write_atomic(&self.path, &body).await?;
        Ok(())
    }
}
