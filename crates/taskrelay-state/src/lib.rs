//! # State Repository
//!
//! A flat, path-keyed store of JSON blobs (spec §4.2): per-trigger cursors,
//! per-cron-task last-run markers, and queue-state dumps all live here under
//! opaque string paths like `tasks/{task_id}/triggers/{trigger_id}`.
//!
//! The only backend shipped is [`LocalDirStateRepository`], which maps a path
//! to `{root}/{path}.json` and implements [`StateRepository::acquire`]'s
//! mutual exclusion with an OS advisory file lock on a sibling `.lock` file,
//! combined with an in-process async mutex so two callers in the same
//! process can't both believe they hold the same path (`flock` is scoped to
//! an open file description, not a process, so two opens from one process
//! would otherwise both succeed).

mod error;
mod local_dir;

pub use error::StateError;
pub use local_dir::LocalDirStateRepository;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

/// Contract every state backend must satisfy (spec §4.2).
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Read the current value at `path`, or `None` if it has never been set.
    async fn get(&self, path: &str) -> Result<Option<Value>, StateError>;

    /// Overwrite the value at `path`.
    async fn set(&self, path: &str, data: Value) -> Result<(), StateError>;

    /// Delete whatever is stored at `path`, if anything.
    async fn clear(&self, path: &str) -> Result<(), StateError>;

    /// Acquire mutually exclusive access to `path` for the scope of the
    /// returned handle. The caller's writes are only durable once
    /// [`StateAcquisition::commit`] is called; dropping the handle without
    /// committing releases the lock and leaves the stored value unchanged.
    async fn acquire(&self, path: &str) -> Result<StateAcquisition, StateError>;
}

/// A scoped, exclusive hold on one state path.
///
/// Holds whatever the backend needs to guarantee exclusivity (lock file
/// handle, in-process mutex guard) behind an opaque `lock` field so it is
/// released deterministically on drop regardless of how the scope exits.
pub struct StateAcquisition {
    path: String,
    value: Option<Value>,
    commit_fn: Box<dyn FnOnce(Value) -> BoxFuture<'static, Result<(), StateError>> + Send>,
    #[allow(dead_code)] // held only for its Drop side effect
    lock: Box<dyn std::any::Any + Send>,
}

impl std::fmt::Debug for StateAcquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateAcquisition")
            .field("path", &self.path)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl StateAcquisition {
    /// The value at this path as of acquisition, or `None` for a fresh path.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The path this acquisition holds.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Persist `data` and release the lock. Consumes the handle: a second
    /// commit is a compile error, matching the spec's "exactly one of
    /// consume/return" acquire-scope discipline used for queue items.
    pub async fn commit(self, data: Value) -> Result<(), StateError> {
        (self.commit_fn)(data).await
    }
}
