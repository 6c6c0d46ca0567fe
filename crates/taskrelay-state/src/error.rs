use thiserror::Error;

/// Failure modes surfaced by a [`crate::StateRepository`] implementation.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state at '{path}' is not valid JSON: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to acquire exclusive lock on '{0}'")]
    LockFailed(String),
}
