//! `QueueStateService` (spec §4.4): dumps a job topic and its paired failed
//! topic to state on shutdown, and reloads them on startup per a pair of
//! four-mode policies (`LOAD` / `LOAD_RESTART` / `ACCUMULATE` / `IGNORE`),
//! applied independently.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskrelay_queue::{QueueError, QueueRepository};
use taskrelay_shared::config::settings::QueueStateMode;
use taskrelay_shared::{ConfigError, Job};
use taskrelay_state::StateRepository;

use crate::error::OrchestrationError;

/// On-disk shape for a topic dump (spec §6.6: `{ "jobs": [...] }`).
#[derive(Debug, Default, Serialize, Deserialize)]
struct TopicDump {
    jobs: Vec<serde_json::Value>,
}

fn state_path(topic_name: &str) -> String {
    format!("topics/{topic_name}")
}

#[derive(Clone)]
pub struct QueueStateService {
    queue: Arc<dyn QueueRepository<Job>>,
    state: Arc<dyn StateRepository>,
    topic: &'static str,
    failed_topic: &'static str,
    queue_mode: QueueStateMode,
    failed_queue_mode: QueueStateMode,
}

impl QueueStateService {
    pub fn new(
        queue: Arc<dyn QueueRepository<Job>>,
        state: Arc<dyn StateRepository>,
        topic: &'static str,
        failed_topic: &'static str,
        queue_mode: QueueStateMode,
        failed_queue_mode: QueueStateMode,
    ) -> Self {
        Self {
            queue,
            state,
            topic,
            failed_topic,
            queue_mode,
            failed_queue_mode,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Load on startup (spec §4.4 "Load"). Applied independently to
    /// `{topic, queue_mode}` and `{failed_topic, failed_queue_mode}`; the
    /// failed side's `LOAD_RESTART` is special-cased to read from the
    /// failed topic's own persisted path but push into the *main* topic.
    pub async fn load(&self) -> Result<(), OrchestrationError> {
        self.apply_load(self.topic, self.queue_mode, self.topic).await?;
        let failed_push_target = if matches!(self.failed_queue_mode, QueueStateMode::LoadRestart) {
            self.topic
        } else {
            self.failed_topic
        };
        self.apply_load(self.failed_topic, self.failed_queue_mode, failed_push_target)
            .await?;
        Ok(())
    }

    async fn apply_load(
        &self,
        state_topic_name: &str,
        mode: QueueStateMode,
        push_target: &str,
    ) -> Result<(), OrchestrationError> {
        if !matches!(mode, QueueStateMode::Load | QueueStateMode::LoadRestart) {
            return Ok(());
        }
        let path = state_path(state_topic_name);
        let Some(value) = self.state.get(&path).await? else {
            return Ok(());
        };
        let dump: TopicDump = serde_json::from_value(value).map_err(ConfigError::from)?;
        let reset_retry_count = matches!(mode, QueueStateMode::LoadRestart);
        let count = dump.jobs.len();
        for raw in dump.jobs {
            let job = Job::from_raw(raw, reset_retry_count)?;
            self.queue.push(push_target, job, false).await?;
        }
        tracing::info!(topic = push_target, count, mode = ?mode, "queue state loaded");
        Ok(())
    }

    /// Dump on shutdown (spec §4.4 "Dump"). Applied independently to
    /// `{topic, queue_mode}` and `{failed_topic, failed_queue_mode}`.
    pub async fn dump(&self) -> Result<(), OrchestrationError> {
        self.apply_dump(self.topic, self.queue_mode).await?;
        self.apply_dump(self.failed_topic, self.failed_queue_mode).await?;
        Ok(())
    }

    async fn apply_dump(&self, topic: &str, mode: QueueStateMode) -> Result<(), OrchestrationError> {
        if matches!(mode, QueueStateMode::Ignore) {
            return Ok(());
        }
        self.queue.close_topic(topic).await;
        let mut collected = Vec::new();
        loop {
            match self.queue.acquire(topic).await {
                Ok(acquisition) => {
                    collected.push(acquisition.item().to_raw());
                    self.queue.consume(topic, acquisition).await?;
                }
                Err(QueueError::TopicFinished(_)) => break,
                Err(err) => return Err(err.into()),
            }
        }

        let path = state_path(topic);
        if matches!(mode, QueueStateMode::Accumulate) {
            let mut existing = match self.state.get(&path).await? {
                Some(value) => {
                    serde_json::from_value::<TopicDump>(value)
                        .map_err(ConfigError::from)?
                        .jobs
                }
                None => Vec::new(),
            };
            existing.extend(collected);
            tracing::info!(topic, count = existing.len(), "queue state accumulated");
            self.state
                .set(&path, serde_json::to_value(TopicDump { jobs: existing }).expect("TopicDump always serializes"))
                .await?;
        } else if collected.is_empty() {
            self.state.clear(&path).await?;
        } else {
            tracing::info!(topic, count = collected.len(), "queue state dumped");
            self.state
                .set(&path, serde_json::to_value(TopicDump { jobs: collected }).expect("TopicDump always serializes"))
                .await?;
        }
        Ok(())
    }
}
