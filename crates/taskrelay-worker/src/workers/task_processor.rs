//! `TaskProcessor[N]` (spec §4.3.2): `Repeatable`, consumes `TASK`, fans out
//! one `TriggerJob` per trigger to `TRIGGER`, and is the sole producer for
//! `TRIGGER` once `TASK` is closed.

use std::sync::Arc;
use std::time::Duration;

use taskrelay_queue::{topics, QueueError, QueueRepository};
use taskrelay_shared::{Job, JobPayload, ProcessingError};

use crate::base::{backoff, delay, route_outcome};
use crate::error::WorkerError;

pub struct TaskProcessor {
    queue: Arc<dyn QueueRepository<Job>>,
    max_retries: u32,
    retry_timeout: Duration,
    delay_timeout: Duration,
}

impl TaskProcessor {
    pub fn new(
        queue: Arc<dyn QueueRepository<Job>>,
        max_retries: u32,
        retry_timeout: Duration,
        delay_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            max_retries,
            retry_timeout,
            delay_timeout,
        }
    }

    async fn fan_out(&self, task: &taskrelay_shared::TaskConfig) -> Result<(), ProcessingError> {
        for trigger in &task.triggers {
            let id = format!("{}/{}", task.id, trigger.id);
            let job = Job::trigger(id, task.id.clone(), trigger.clone(), task.actions.clone());
            self.queue
                .push(topics::TRIGGER, job, true)
                .await
                .map_err(ProcessingError::from)?;
        }
        Ok(())
    }

    /// Runs until `TASK` finishes, then closes `TRIGGER` and returns.
    pub async fn run(&self) {
        loop {
            match self.queue.acquire(topics::TASK).await {
                Err(QueueError::TopicFinished(_)) => {
                    self.queue.close_topic(topics::TRIGGER).await;
                    tracing::info!("task processor finished, TRIGGER closed");
                    return;
                }
                Err(err) => {
                    tracing::error!(error = %err, "task processor acquire failed unexpectedly");
                    return;
                }
                Ok(acquisition) => {
                    let task = match &acquisition.item().payload {
                        JobPayload::Task { task } => task.clone(),
                        other => {
                            tracing::error!(payload = ?other, "non-task job on TASK topic, dropping");
                            let _ = self.queue.release(topics::TASK, acquisition).await;
                            continue;
                        }
                    };
                    let outcome = self.fan_out(&task).await;
                    let routed: Result<(), WorkerError> = route_outcome(
                        self.queue.as_ref(),
                        topics::TASK,
                        topics::FAILED_TASK,
                        self.max_retries,
                        acquisition,
                        outcome,
                    )
                    .await;
                    match routed {
                        Err(err) => {
                            tracing::warn!(error = %err, "task processor job failed");
                            backoff(self.retry_timeout).await;
                        }
                        Ok(()) => delay(self.delay_timeout).await,
                    }
                }
            }
        }
    }
}
