use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{Acquisition, AcquisitionBackend, QueueError, QueueItem, QueueKey, QueueRepository};

struct TopicEntry<T> {
    items: VecDeque<T>,
    in_flight: HashSet<QueueKey>,
    closed: bool,
    notify: Arc<Notify>,
}

impl<T> TopicEntry<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            in_flight: HashSet::new(),
            closed: false,
            notify: Arc::new(Notify::new()),
        }
    }

    fn finished(&self) -> bool {
        self.closed && self.items.is_empty() && self.in_flight.is_empty()
    }
}

/// The topic map, held behind a plain `std::sync::Mutex` rather than
/// `tokio::sync::Mutex` so an [`Acquisition`]'s `Drop` impl can return an
/// unconsumed item synchronously, with no async runtime required at drop
/// time. No critical section below ever holds the lock across an `.await`.
struct Shared<T> {
    topics: Mutex<HashMap<String, TopicEntry<T>>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TopicEntry<T>>> {
        self.topics.lock().expect("queue topic map mutex poisoned")
    }
}

impl<T: QueueItem> AcquisitionBackend<T> for Shared<T> {
    fn return_item(&self, topic: &str, key: QueueKey, item: T) {
        let mut topics = self.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
        entry.in_flight.remove(&key);
        entry.items.push_back(item);
        debug!(topic, ?key, "acquisition dropped without consume/release; item returned");
        entry.notify.notify_waiters();
    }
}

/// Default, in-process topic backend (spec §4.1, "Backends").
///
/// Every topic is created lazily on first touch (push, acquire, or
/// `close_topic`), so a topic nobody ever pushed to can still be closed and
/// observed as finished immediately — this is what lets `S1` (empty task
/// list) drain with no special-casing.
pub struct InMemoryQueueRepository<T: QueueItem> {
    shared: Arc<Shared<T>>,
}

impl<T: QueueItem> Default for InMemoryQueueRepository<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                topics: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T: QueueItem> InMemoryQueueRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: QueueItem> QueueRepository<T> for InMemoryQueueRepository<T> {
    async fn push(&self, topic: &str, item: T, validate_open: bool) -> Result<(), QueueError> {
        let mut topics = self.shared.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
        if validate_open && entry.closed {
            return Err(QueueError::TopicClosed(topic.to_string()));
        }
        trace!(topic, ?item, "queue push");
        entry.items.push_back(item);
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn acquire(&self, topic: &str) -> Result<Acquisition<T>, QueueError> {
        loop {
            let notified = {
                let mut topics = self.shared.lock();
                let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
                if let Some(item) = entry.items.pop_front() {
                    let key = item.queue_key();
                    entry.in_flight.insert(key.clone());
                    trace!(topic, ?key, "queue acquire");
                    return Ok(Acquisition::new(item, key, topic.to_string(), self.shared.clone()));
                }
                if entry.finished() {
                    return Err(QueueError::TopicFinished(topic.to_string()));
                }
                let notify = entry.notify.clone();
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                // SAFETY-free: `enable()` registers this waiter while the lock is
                // still held, so a push/close racing with the lock release below
                // cannot be missed.
                notified
            };
            notified.await;
        }
    }

    async fn consume(&self, topic: &str, mut acquisition: Acquisition<T>) -> Result<(), QueueError> {
        let key = acquisition.key().clone();
        acquisition.take();
        let mut topics = self.shared.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
        if !entry.in_flight.remove(&key) {
            return Err(QueueError::UnknownAcquisition(key, topic.to_string()));
        }
        debug!(topic, ?key, "queue consume");
        if entry.finished() {
            entry.notify.notify_waiters();
        }
        Ok(())
    }

    async fn release(&self, topic: &str, mut acquisition: Acquisition<T>) -> Result<(), QueueError> {
        let key = acquisition.key().clone();
        let item = acquisition.take();
        let mut topics = self.shared.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
        entry.in_flight.remove(&key);
        debug!(topic, ?key, "queue release (returned to queue)");
        entry.items.push_back(item);
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn close_topic(&self, topic: &str) {
        let mut topics = self.shared.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(TopicEntry::new);
        entry.closed = true;
        debug!(topic, "queue closed");
        entry.notify.notify_waiters();
    }

    async fn is_topic_finished(&self, topic: &str) -> bool {
        let topics = self.shared.lock();
        topics.get(topic).map(TopicEntry::finished).unwrap_or(false)
    }

    async fn is_topic_empty(&self, topic: &str) -> bool {
        let topics = self.shared.lock();
        topics.get(topic).map(|e| e.items.is_empty()).unwrap_or(true)
    }

    async fn peek_all(&self, topic: &str) -> Vec<T> {
        let topics = self.shared.lock();
        topics
            .get(topic)
            .map(|e| e.items.iter().cloned().collect())
            .unwrap_or_default()
    }
}
