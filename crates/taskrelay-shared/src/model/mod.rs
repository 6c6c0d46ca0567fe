mod event;
mod job;
mod plugin_spec;
mod task;

pub use event::Event;
pub use job::{Job, JobPayload};
pub use plugin_spec::{validate_id, validate_unique_ids, ActionConfig, PluginSpec, TriggerConfig};
pub use task::{CronTaskState, TaskConfig, TaskKind};
