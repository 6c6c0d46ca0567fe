//! Reads and parses the root task configuration (spec §4's `ConfigRepository`).

pub mod settings;

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::model::{validate_id, TaskConfig};

pub use settings::Settings;

/// `{ tasks: [TaskConfig] }` (spec §6.3).
#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub tasks: Vec<TaskConfig>,
}

impl RootConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            validate_id(&task.id)?;
            if !seen.insert(task.id.clone()) {
                return Err(ConfigError::DuplicateId {
                    id: task.id.clone(),
                    scope: "tasks".to_string(),
                });
            }
            task.validate()?;
        }
        Ok(())
    }
}

/// Reads the root task configuration from a YAML file (spec §2, §6.3).
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    path: PathBuf,
}

impl ConfigRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get_config(&self) -> Result<RootConfig, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let config: RootConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: self.path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}
