//! Model registry: a flat `registry.toml` mapping model names to their
//! executable and default-config paths.
//!
//! A model name resolves to its binary + default config, failing fast with
//! a descriptive error rather than panicking when either is missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RegistryError;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub executable: PathBuf,
    pub default_config: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    models: HashMap<String, ModelInfo>,
}

/// The set of models known to this coordinator, loaded once from disk.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelInfo>,
}

impl ModelRegistry {
    /// Load `registry.toml` from the given path.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: RegistryFile = toml::from_str(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            models: parsed.models,
        })
    }

    /// Look up a model by name, failing fast with a descriptive error if
    /// it isn't registered.
    pub fn lookup(&self, name: &str) -> Result<&ModelInfo, RegistryError> {
        self.models
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}
