use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

use super::plugin_spec::{validate_unique_ids, ActionConfig, TriggerConfig};
use crate::errors::ConfigError;

/// A task's scheduling discriminator (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Eligible exactly once per process invocation.
    OncePerRun,
    /// Eligible once the next scheduled occurrence after `last_run` has
    /// passed; a task with no `last_run` yet is always ready.
    Cron { schedule: String },
}

/// One task definition from the root task-configuration file (spec §3, §6.3).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskConfig {
    pub id: String,
    pub kind: TaskKind,
    pub triggers: Vec<TriggerConfig>,
    pub actions: Vec<ActionConfig>,
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        super::plugin_spec::validate_id(&self.id)?;
        validate_unique_ids(self.triggers.iter(), &format!("task '{}' triggers", self.id))?;
        validate_unique_ids(self.actions.iter(), &format!("task '{}' actions", self.id))?;
        if let TaskKind::Cron { schedule } = &self.kind {
            crate::cron::parse_schedule(schedule)?;
        }
        Ok(())
    }
}

/// The `type` discriminator on `TaskConfig` is serde-internally-tagged but
/// defaults to `once_per_run` when absent, something serde's built-in
/// internally-tagged enum support cannot express on its own (spec §9,
/// "polymorphic configs" -> tagged variants, with the core resolving the
/// default itself).
impl<'de> Deserialize<'de> for TaskConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            #[serde(rename = "type", default)]
            type_: Option<String>,
            #[serde(default)]
            schedule: Option<String>,
            #[serde(default)]
            triggers: Vec<RawSpec>,
            #[serde(default)]
            actions: Vec<RawSpec>,
        }

        #[derive(Deserialize)]
        struct RawSpec {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            id: Option<String>,
            #[serde(flatten)]
            params: serde_json::Map<String, serde_json::Value>,
        }

        fn resolve_specs(raw: Vec<RawSpec>) -> Vec<TriggerConfig> {
            let mut seen_default_counts: std::collections::HashMap<String, usize> =
                std::collections::HashMap::new();
            raw.into_iter()
                .map(|r| {
                    let id = r.id.unwrap_or_else(|| {
                        let count = seen_default_counts.entry(r.kind.clone()).or_insert(0);
                        let id = if *count == 0 {
                            r.kind.clone()
                        } else {
                            format!("{}-{}", r.kind, count)
                        };
                        *count += 1;
                        id
                    });
                    TriggerConfig {
                        kind: r.kind,
                        id,
                        params: r.params,
                    }
                })
                .collect()
        }

        let raw = Raw::deserialize(deserializer)?;
        let kind = match raw.type_.as_deref().unwrap_or("once_per_run") {
            "once_per_run" => TaskKind::OncePerRun,
            "cron" => {
                let schedule = raw
                    .schedule
                    .ok_or_else(|| DeError::missing_field("schedule"))?;
                TaskKind::Cron { schedule }
            }
            other => return Err(DeError::custom(ConfigError::UnknownTaskType(other.to_string()))),
        };

        Ok(TaskConfig {
            id: raw.id,
            kind,
            triggers: resolve_specs(raw.triggers),
            actions: resolve_specs(raw.actions),
        })
    }
}

/// Per-cron-task readiness state persisted at `tasks/{task_id}/state`
/// (spec §3, §4.3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTaskState {
    pub last_run: Option<DateTime<Utc>>,
}
