//! Configuration management for the workflow service

use crate::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use workflow_types::Role;

/// Raw configuration structure matching the JSON file
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default, alias = "definitions")]
    pub definitions_file: Option<PathBuf>,

    /// Actor id -> role names, parsed into [`Role`] after loading
    #[serde(default, alias = "users")]
    pub identities: BTreeMap<String, Vec<String>>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub storage: StorageConfig,
    pub definitions_file: Option<PathBuf>,
    pub identities: BTreeMap<String, BTreeSet<Role>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    #[serde(alias = "path", default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

// Default functions
fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data/workflows")
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            definitions_file: None,
            identities: BTreeMap::new(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw_config: RawConfig = serde_json::from_str(json)
            .map_err(|e| WorkflowError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self::from_raw_config(raw_config)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert raw config to structured config, parsing role names
    fn from_raw_config(raw: RawConfig) -> Result<Self> {
        let mut identities = BTreeMap::new();
        for (actor, role_names) in raw.identities {
            let roles = role_names
                .iter()
                .map(|name| {
                    name.parse::<Role>().map_err(|e| {
                        WorkflowError::Config(format!("Actor '{}': {}", actor, e))
                    })
                })
                .collect::<Result<BTreeSet<_>>>()?;
            identities.insert(actor, roles);
        }

        Ok(Self {
            storage: raw.storage,
            definitions_file: raw.definitions_file,
            identities,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::File
            && self.storage.data_dir.as_os_str().is_empty()
        {
            return Err(WorkflowError::Config(
                "File storage requires a data_dir".to_string(),
            ));
        }

        if let Some(actor) = self.identities.keys().find(|actor| actor.trim().is_empty()) {
            return Err(WorkflowError::Config(format!(
                "Identity entries need a non-empty actor id, got '{}'",
                actor
            )));
        }

        Ok(())
    }
}
