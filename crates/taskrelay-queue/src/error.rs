use thiserror::Error;

/// Failure modes surfaced by a [`crate::QueueRepository`] implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("topic '{0}' is closed")]
    TopicClosed(String),

    #[error("topic '{0}' is finished")]
    TopicFinished(String),

    #[error("no item is leased under key {0:?} on topic '{1}'")]
    UnknownAcquisition((String, u64), String),
}
