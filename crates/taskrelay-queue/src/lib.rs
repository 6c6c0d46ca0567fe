//! # Topic Queues
//!
//! Named, lifecycle-managed FIFO queues ("topics") that carry jobs between the
//! pipeline's worker stages. A topic moves monotonically through three states:
//!
//! ```text
//! OPEN -> CLOSED -> FINISHED
//! ```
//!
//! `OPEN` accepts pushes and delivers items to consumers. `CLOSED` rejects
//! pushes from external producers (an explicit `push(validate_open = false)`
//! still gets through — that's how retries and returned items survive a
//! draining topic) but keeps delivering whatever is left. `FINISHED` means
//! closed, empty, and nothing in flight; a topic can never leave `FINISHED`.
//!
//! The only backend shipped here is in-memory, selected like any other plugin
//! via the caller's registry — a durable backend is free to implement
//! [`QueueRepository`] the same way.

mod error;
mod memory;

pub use error::QueueError;
pub use memory::InMemoryQueueRepository;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Well-known topic names used by the pipeline.
pub mod topics {
    pub const TASK: &str = "TASK";
    pub const TRIGGER: &str = "TRIGGER";
    pub const EVENT: &str = "EVENT";
    pub const FAILED_TASK: &str = "FAILED_TASK";
    pub const FAILED_TRIGGER: &str = "FAILED_TRIGGER";
    pub const FAILED_EVENT: &str = "FAILED_EVENT";
}

/// Identity key an in-memory topic uses for in-flight bookkeeping.
///
/// Retrying a job keeps its `id` but increments `retry_count`; the pair is
/// what dedupe/in-flight tracking keys on, never `id` alone (spec §9, "retry
/// copy semantics").
pub type QueueKey = (String, u64);

/// Anything that can travel through a [`QueueRepository`] topic.
///
/// Kept deliberately minimal so this crate has no dependency on the job
/// model: `taskrelay-shared::model::Job` is the only implementor in this
/// workspace, but the queue layer itself only needs a stable identity key.
pub trait QueueItem: Clone + fmt::Debug + Send + Sync + 'static {
    fn queue_key(&self) -> QueueKey;
}

/// Backend hook an [`Acquisition`] uses to return itself to its topic if
/// dropped without being consumed or released. Implemented by the backend
/// that issued the acquisition so the return happens synchronously in
/// `Drop`, with no dependency on an async runtime being available at drop
/// time.
pub(crate) trait AcquisitionBackend<T>: Send + Sync {
    fn return_item(&self, topic: &str, key: QueueKey, item: T);
}

/// A leased item plus the information needed to consume or return it.
///
/// Scope exit without an explicit `consume`/`release` call — a cancelled
/// worker, a panic, `Scheduler::dispose` aborting a straggler — still returns
/// the item to its topic and clears its in-flight slot via `Drop` (spec
/// §4.1, "scope exit without consume -> the item is returned (re-pushed
/// `validateOpen=false`); in all cases the in-flight counter is
/// decremented"). `consume`/`release` take the item out first, which disarms
/// this.
pub struct Acquisition<T: QueueItem> {
    item: Option<T>,
    pub(crate) key: QueueKey,
    pub(crate) topic: String,
    pub(crate) backend: Arc<dyn AcquisitionBackend<T>>,
}

impl<T: QueueItem> Acquisition<T> {
    pub(crate) fn new(item: T, key: QueueKey, topic: String, backend: Arc<dyn AcquisitionBackend<T>>) -> Self {
        Self {
            item: Some(item),
            key,
            topic,
            backend,
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// The leased item.
    pub fn item(&self) -> &T {
        self.item.as_ref().expect("acquisition item taken before drop")
    }

    /// Take the item out, disarming the drop-time return. Used by `consume`
    /// and `release`, which each handle the in-flight/requeue bookkeeping
    /// themselves.
    pub(crate) fn take(&mut self) -> T {
        self.item.take().expect("acquisition item already taken")
    }
}

impl<T: QueueItem> fmt::Debug for Acquisition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquisition")
            .field("item", &self.item)
            .field("key", &self.key)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl<T: QueueItem> Drop for Acquisition<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.backend.return_item(&self.topic, self.key.clone(), item);
        }
    }
}

/// Contract every queue backend must satisfy (spec §4.1).
#[async_trait]
pub trait QueueRepository<T: QueueItem>: Send + Sync {
    /// Push `item` onto `topic`. When `validate_open` is true (the default
    /// for external producers), pushing to a `CLOSED` or `FINISHED` topic
    /// fails with [`QueueError::TopicClosed`]. Retries and returned items
    /// push with `validate_open = false` so a draining topic still accepts
    /// them.
    async fn push(&self, topic: &str, item: T, validate_open: bool) -> Result<(), QueueError>;

    /// Block until an item is available or the topic finishes. Returns
    /// [`QueueError::TopicFinished`] once the topic is drained and closed.
    async fn acquire(&self, topic: &str) -> Result<Acquisition<T>, QueueError>;

    /// Acknowledge successful processing of a leased item, releasing its
    /// in-flight slot without returning it to the queue.
    async fn consume(&self, topic: &str, acquisition: Acquisition<T>) -> Result<(), QueueError>;

    /// Return a leased item to the queue without acknowledging it — the
    /// explicit counterpart to letting an `Acquisition` simply drop, for
    /// callers that know up front they want to put the item back (e.g. a
    /// job whose payload doesn't match the topic it was found on).
    async fn release(&self, topic: &str, acquisition: Acquisition<T>) -> Result<(), QueueError>;

    /// Transition `topic` from `OPEN` to `CLOSED`. Idempotent.
    async fn close_topic(&self, topic: &str);

    /// True iff `topic` is closed, empty, and has nothing in flight.
    async fn is_topic_finished(&self, topic: &str) -> bool;

    /// True iff `topic` currently has zero queued items (regardless of
    /// in-flight count or open/closed state).
    async fn is_topic_empty(&self, topic: &str) -> bool;

    /// Snapshot every item currently queued (not in-flight) on `topic`,
    /// without removing them. Used by diagnostics; the state-dump path uses
    /// `acquire`+`consume` instead so in-flight items are captured too.
    async fn peek_all(&self, topic: &str) -> Vec<T>;
}
