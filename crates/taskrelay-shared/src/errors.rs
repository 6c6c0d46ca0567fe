//! Typed error hierarchy shared by every layer built on top of this crate
//! (spec §7). Lower crates (`taskrelay-queue`, `taskrelay-state`) have their
//! own narrow error types; this module holds the two kinds that are
//! meaningful at the config/plugin boundary this crate owns, plus
//! [`ProcessingError`], the catch-all a trigger or action implementation
//! raises and which the worker crate wraps into its own retry/fail routing.

use thiserror::Error;

/// Malformed `RootConfig`, malformed `Settings`, or an unresolved secret
/// (spec §7). Fatal wherever it is raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML at '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to deserialize JSON value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate id '{id}' in {scope}")]
    DuplicateId { id: String, scope: String },

    #[error("invalid id '{id}': ids may only contain letters, digits, '_', '-', '=', '/'")]
    InvalidId { id: String },

    #[error("unknown task type '{0}', expected 'once_per_run' or 'cron'")]
    UnknownTaskType(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("invalid cron schedule '{0}'")]
    InvalidSchedule(String),

    #[error("invalid log filter directive '{0}'")]
    InvalidLogFilter(String),

    #[error("secret of kind '{0}' could not be resolved: environment variable not set")]
    MissingSecret(String),

    #[error("no '{kind}' plugin registered for kind '{registry}'")]
    UnknownPlugin { kind: String, registry: &'static str },

    #[error("settings could not be loaded: {0}")]
    Settings(#[from] config::ConfigError),
}

/// The error a `TriggerProcessor`/`ActionProcessor` implementation raises
/// (spec §7, "ProcessingError"). Opaque by design: the core never
/// interprets a plugin's failure reason, only whether one occurred, so it
/// can decide retry vs. fail-routing.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ProcessingError(#[from] anyhow::Error);

impl ProcessingError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(err.into())
    }

    pub fn msg(text: impl Into<String>) -> Self {
        Self(anyhow::anyhow!(text.into()))
    }
}

impl From<ConfigError> for ProcessingError {
    fn from(err: ConfigError) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl From<taskrelay_state::StateError> for ProcessingError {
    fn from(err: taskrelay_state::StateError) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl From<taskrelay_queue::QueueError> for ProcessingError {
    fn from(err: taskrelay_queue::QueueError) -> Self {
        Self(anyhow::Error::new(err))
    }
}
