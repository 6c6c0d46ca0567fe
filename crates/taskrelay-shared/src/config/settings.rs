//! The process-level configuration tree (spec §6.1, §6.2), distinct from
//! [`crate::config::RootConfig`] (the task definitions the pipeline runs).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;

/// Four-mode vocabulary a `QueueStateService` instance runs under (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStateMode {
    Load,
    LoadRestart,
    Accumulate,
    Ignore,
}

impl Default for QueueStateMode {
    fn default() -> Self {
        QueueStateMode::Ignore
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub env: String,
    pub debug: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigBackendSettings {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub path: String,
}

impl Default for ConfigBackendSettings {
    fn default() -> Self {
        Self {
            backend_type: "yaml_file".to_string(),
            path: "tasks.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueBackendSettings {
    #[serde(rename = "type")]
    pub backend_type: String,
}

impl Default for QueueBackendSettings {
    fn default() -> Self {
        Self {
            backend_type: "memory".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateBackendSettings {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub path: String,
}

impl Default for StateBackendSettings {
    fn default() -> Self {
        Self {
            backend_type: "local_dir".to_string(),
            path: "state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub limit: usize,
    pub pending_limit: usize,
    pub timeout: u64,
    pub close_timeout: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            limit: 16,
            pending_limit: 0,
            timeout: 0,
            close_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub max_retries: u32,
    pub queue_state_mode: QueueStateMode,
    pub failed_queue_state_mode: QueueStateMode,
    /// Pause between successful `Repeatable` iterations. Not named in
    /// spec §6.2's settings table, which only specifies the OneShot/
    /// Repeatable *semantics*; exposed here so a deployment can tune it
    /// instead of the core hard-coding it.
    pub delay_timeout_ms: u64,
    /// Backoff after a failed iteration/attempt (spec §4.3 `retry_timeout`).
    pub retry_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 1,
            max_retries: 3,
            queue_state_mode: QueueStateMode::Ignore,
            failed_queue_state_mode: QueueStateMode::Ignore,
            delay_timeout_ms: 50,
            retry_timeout_ms: 500,
        }
    }
}

impl WorkerSettings {
    pub fn delay_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay_timeout_ms)
    }

    pub fn retry_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksSettings {
    pub config_backend: ConfigBackendSettings,
    pub queue_backend: QueueBackendSettings,
    pub state_backend: StateBackendSettings,
    pub scheduler: SchedulerSettings,
    pub task_processor: WorkerSettings,
    pub trigger_processor: WorkerSettings,
    pub event_processor: WorkerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub logs: LogSettings,
    pub tasks: TasksSettings,
}

/// Environment-variable prefix for `Settings` overrides (spec §6.1).
pub const DEFAULT_ENV_PREFIX: &str = "TASKRELAY";
/// Variable naming the YAML settings file; unset means defaults + env only.
pub const SETTINGS_YAML_VAR: &str = "TASKRELAY_SETTINGS_YAML";

/// Load `Settings` from defaults, an optional YAML file, and `TASKRELAY_*`
/// environment overrides, in that ascending order of precedence (spec §6.2).
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_with_prefix(DEFAULT_ENV_PREFIX)
}

pub fn load_settings_with_prefix(env_prefix: &str) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    let yaml_var = format!("{env_prefix}_SETTINGS_YAML");
    if let Ok(path) = std::env::var(&yaml_var) {
        builder = builder.add_source(config::File::with_name(&path));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(env_prefix)
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;

    if settings.app.debug && settings.app.env != "development" {
        warn!(
            env = %settings.app.env,
            "app.debug=true outside app.env=development"
        );
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_with_no_env_or_file() {
        std::env::remove_var("TASKRELAY_SETTINGS_YAML");
        let settings = load_settings().unwrap();
        assert_eq!(settings.app.env, "development");
        assert_eq!(settings.tasks.scheduler.limit, 16);
        assert_eq!(settings.tasks.task_processor.count, 1);
    }

    #[test]
    #[serial]
    fn env_override_beats_default() {
        std::env::set_var("TASKRELAY_APP__ENV", "production");
        let settings = load_settings().unwrap();
        std::env::remove_var("TASKRELAY_APP__ENV");
        assert_eq!(settings.app.env, "production");
    }
}
