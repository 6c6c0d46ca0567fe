use std::time::Duration;

use taskrelay_queue::QueueError;
use taskrelay_shared::ConfigError;
use taskrelay_state::StateError;
use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Internal error surfaced by [`crate::queue_state::QueueStateService`]
/// while dumping or loading a topic pair.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One `Lifecycle` startup callback failed; startup aborts at the first
/// failure (spec §4.6).
#[derive(Debug, Error)]
#[error("startup callback '{callback}' failed: {source}")]
pub struct StartupError {
    pub callback: String,
    #[source]
    pub source: anyhow::Error,
}

/// One or more `Lifecycle` shutdown callbacks failed. Unlike startup,
/// shutdown runs every callback regardless of earlier failures and reports
/// them all together (spec §4.6).
#[derive(Debug)]
pub struct ShutdownError {
    pub failures: Vec<(String, anyhow::Error)>,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} shutdown callback(s) failed: ", self.failures.len())?;
        for (i, (name, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{name}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// The drain loop (spec §4.6) ran past its configured `timeout` without the
/// scheduler and every non-failed topic going quiet.
#[derive(Debug, Error)]
#[error("drain loop exceeded timeout of {0:?}")]
pub struct ApplicationTimeoutError(pub Duration);

/// The drain loop finished but one or more `FAILED_*` topics are non-empty.
#[derive(Debug, Error)]
#[error("{0} job(s) landed in a failed topic")]
pub struct ApplicationFailedJobsError(pub usize);

/// Terminal error returned by [`crate::application::Application::start`],
/// mapped to a process exit code by the binary (spec §6.7, §7).
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error(transparent)]
    Timeout(#[from] ApplicationTimeoutError),
    #[error(transparent)]
    FailedJobs(#[from] ApplicationFailedJobsError),
    #[error(transparent)]
    Dispose(#[from] SchedulerError),
    #[error("unrecognized backend '{backend}' for {registry}")]
    UnknownBackend { backend: String, registry: &'static str },
    #[error(transparent)]
    Runtime(anyhow::Error),
}

impl ApplicationError {
    /// Exit code per spec §6.7: `0` clean, `1` generic runtime failure,
    /// `2` configuration error, `3` drain-loop timeout, `4` jobs landed in a
    /// failed topic.
    pub fn exit_code(&self) -> i32 {
        match self {
            ApplicationError::Config(_) | ApplicationError::UnknownBackend { .. } => 2,
            ApplicationError::Timeout(_) => 3,
            ApplicationError::FailedJobs(_) => 4,
            _ => 1,
        }
    }
}
