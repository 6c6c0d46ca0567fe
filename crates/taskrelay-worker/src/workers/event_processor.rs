//! `EventProcessor[N]` (spec §4.3.4): `Repeatable`, consumes `EVENT`,
//! invokes the configured action per event. No downstream topic to close.

use std::sync::Arc;
use std::time::Duration;

use taskrelay_queue::{topics, QueueError, QueueRepository};
use taskrelay_shared::{ActionConfig, Event, Job, JobPayload, ProcessingError, Registry};

use crate::base::{backoff, delay, route_outcome};
use crate::error::WorkerError;

pub struct EventProcessor {
    queue: Arc<dyn QueueRepository<Job>>,
    registry: Arc<Registry>,
    max_retries: u32,
    retry_timeout: Duration,
    delay_timeout: Duration,
}

impl EventProcessor {
    pub fn new(
        queue: Arc<dyn QueueRepository<Job>>,
        registry: Arc<Registry>,
        max_retries: u32,
        retry_timeout: Duration,
        delay_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            max_retries,
            retry_timeout,
            delay_timeout,
        }
    }

    async fn process_event(&self, event: &Event, action: &ActionConfig) -> Result<(), ProcessingError> {
        let mut processor = self.registry.build_action(action)?;
        processor.process(event).await?;
        processor.dispose().await?;
        Ok(())
    }

    /// Runs until `EVENT` finishes, then returns (no downstream topic).
    pub async fn run(&self) {
        loop {
            match self.queue.acquire(topics::EVENT).await {
                Err(QueueError::TopicFinished(_)) => {
                    tracing::info!("event processor finished");
                    return;
                }
                Err(err) => {
                    tracing::error!(error = %err, "event processor acquire failed unexpectedly");
                    return;
                }
                Ok(acquisition) => {
                    let (event, action) = match &acquisition.item().payload {
                        JobPayload::Event { event, action } => (event.clone(), action.clone()),
                        other => {
                            tracing::error!(payload = ?other, "non-event job on EVENT topic, dropping");
                            let _ = self.queue.release(topics::EVENT, acquisition).await;
                            continue;
                        }
                    };
                    let outcome = self.process_event(&event, &action).await;
                    let routed: Result<(), WorkerError> = route_outcome(
                        self.queue.as_ref(),
                        topics::EVENT,
                        topics::FAILED_EVENT,
                        self.max_retries,
                        acquisition,
                        outcome,
                    )
                    .await;
                    match routed {
                        Err(err) => {
                            tracing::warn!(error = %err, "event processor job failed");
                            backoff(self.retry_timeout).await;
                        }
                        Ok(()) => delay(self.delay_timeout).await,
                    }
                }
            }
        }
    }
}
