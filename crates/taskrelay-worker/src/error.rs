//! Worker-level error type (spec §7): every lower-crate error a worker can
//! see funnels through here before the orchestration crate wraps it again
//! into `ApplicationError`.

use taskrelay_queue::QueueError;
use taskrelay_shared::{ConfigError, ProcessingError};
use taskrelay_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}
