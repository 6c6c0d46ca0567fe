//! # taskrelay-shared
//!
//! The data model, settings, plugin registry, and logging init shared by
//! every other crate in the workspace. Nothing here drives the pipeline;
//! this crate defines what a job, task, event, and plugin *is*, and how the
//! process is configured and logs.

pub mod config;
pub mod cron;
pub mod errors;
pub mod logging;
pub mod model;
pub mod plugins;
pub mod registry;

pub use config::{ConfigRepository, RootConfig, Settings};
pub use errors::{ConfigError, ProcessingError};
pub use model::{ActionConfig, CronTaskState, Event, Job, JobPayload, PluginSpec, TaskConfig, TaskKind, TriggerConfig};
pub use plugins::{ActionProcessor, SecretResolver, TriggerProcessor};
pub use registry::Registry;
