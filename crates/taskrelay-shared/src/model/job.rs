use serde::{Deserialize, Serialize};
use taskrelay_queue::{QueueItem, QueueKey};

use super::event::Event;
use super::plugin_spec::{ActionConfig, TriggerConfig};
use super::task::TaskConfig;
use crate::errors::ConfigError;

/// The payload carried by a [`Job`] through the pipeline (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobPayload {
    Task {
        task: TaskConfig,
    },
    Trigger {
        task_id: String,
        trigger: TriggerConfig,
        actions: Vec<ActionConfig>,
    },
    Event {
        event: Event,
        action: ActionConfig,
    },
}

/// A unit of work traveling through the pipeline (spec §3).
///
/// Identity for in-flight/dedupe purposes is `(id, retry_count)`, never `id`
/// alone: a retry is a distinct queue entry that happens to share the same
/// logical lineage (spec §9, "retry copy semantics").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub retry_count: u64,
    pub payload: JobPayload,
}

impl Job {
    pub fn task(id: impl Into<String>, task: TaskConfig) -> Self {
        Self {
            id: id.into(),
            retry_count: 0,
            payload: JobPayload::Task { task },
        }
    }

    pub fn trigger(
        id: impl Into<String>,
        task_id: impl Into<String>,
        trigger: TriggerConfig,
        actions: Vec<ActionConfig>,
    ) -> Self {
        Self {
            id: id.into(),
            retry_count: 0,
            payload: JobPayload::Trigger {
                task_id: task_id.into(),
                trigger,
                actions,
            },
        }
    }

    pub fn event(id: impl Into<String>, event: Event, action: ActionConfig) -> Self {
        Self {
            id: id.into(),
            retry_count: 0,
            payload: JobPayload::Event { event, action },
        }
    }

    /// A copy equal in `id`, with `retry_count` incremented by one.
    pub fn retry_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.retry_count += 1;
        copy
    }

    pub fn to_raw(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Job always serializes")
    }

    /// Round-trip a persisted job back into memory, optionally resetting
    /// `retry_count` to zero (used by `QueueStateService` under
    /// `LOAD_RESTART`, spec §4.4, testable property 5).
    pub fn from_raw(raw: serde_json::Value, reset_retry_count: bool) -> Result<Self, ConfigError> {
        let mut job: Job = serde_json::from_value(raw)?;
        if reset_retry_count {
            job.retry_count = 0;
        }
        Ok(job)
    }
}

impl QueueItem for Job {
    fn queue_key(&self) -> QueueKey {
        (self.id.clone(), self.retry_count)
    }
}
