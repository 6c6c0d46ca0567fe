//! `TriggerProcessor[N]` (spec §4.3.3): `Repeatable`, consumes `TRIGGER`,
//! drains each configured trigger's event stream into `EVENT` (one
//! `EventJob` per event per action), and is the sole producer for `EVENT`
//! once `TRIGGER` is closed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use taskrelay_queue::{topics, QueueError, QueueRepository};
use taskrelay_shared::{ActionConfig, Job, JobPayload, ProcessingError, Registry, TriggerConfig};
use taskrelay_state::StateRepository;

use crate::base::{backoff, delay, route_outcome};
use crate::error::WorkerError;

pub struct TriggerProcessor {
    queue: Arc<dyn QueueRepository<Job>>,
    state: Arc<dyn StateRepository>,
    registry: Arc<Registry>,
    max_retries: u32,
    retry_timeout: Duration,
    delay_timeout: Duration,
}

impl TriggerProcessor {
    pub fn new(
        queue: Arc<dyn QueueRepository<Job>>,
        state: Arc<dyn StateRepository>,
        registry: Arc<Registry>,
        max_retries: u32,
        retry_timeout: Duration,
        delay_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            state,
            registry,
            max_retries,
            retry_timeout,
            delay_timeout,
        }
    }

    async fn process_trigger(
        &self,
        task_id: &str,
        trigger: &TriggerConfig,
        actions: &[ActionConfig],
    ) -> Result<(), ProcessingError> {
        let path = format!("tasks/{task_id}/triggers/{}", trigger.id);
        let state = self.state.acquire(&path).await?;
        let mut processor = self.registry.build_trigger(trigger, state)?;
        {
            let mut events = processor.produce_events();
            while let Some(event) = events.next().await {
                let event = event?;
                for action in actions {
                    let id = format!("{task_id}/{}/{}/{}", trigger.id, action.id, event.id);
                    let job = Job::event(id, event.clone(), action.clone());
                    self.queue
                        .push(topics::EVENT, job, true)
                        .await
                        .map_err(ProcessingError::from)?;
                }
            }
        }
        processor.dispose().await?;
        Ok(())
    }

    /// Runs until `TRIGGER` finishes, then closes `EVENT` and returns.
    pub async fn run(&self) {
        loop {
            match self.queue.acquire(topics::TRIGGER).await {
                Err(QueueError::TopicFinished(_)) => {
                    self.queue.close_topic(topics::EVENT).await;
                    tracing::info!("trigger processor finished, EVENT closed");
                    return;
                }
                Err(err) => {
                    tracing::error!(error = %err, "trigger processor acquire failed unexpectedly");
                    return;
                }
                Ok(acquisition) => {
                    let (task_id, trigger, actions) = match &acquisition.item().payload {
                        JobPayload::Trigger {
                            task_id,
                            trigger,
                            actions,
                        } => (task_id.clone(), trigger.clone(), actions.clone()),
                        other => {
                            tracing::error!(payload = ?other, "non-trigger job on TRIGGER topic, dropping");
                            let _ = self.queue.release(topics::TRIGGER, acquisition).await;
                            continue;
                        }
                    };
                    let outcome = self.process_trigger(&task_id, &trigger, &actions).await;
                    let routed: Result<(), WorkerError> = route_outcome(
                        self.queue.as_ref(),
                        topics::TRIGGER,
                        topics::FAILED_TRIGGER,
                        self.max_retries,
                        acquisition,
                        outcome,
                    )
                    .await;
                    match routed {
                        Err(err) => {
                            tracing::warn!(error = %err, "trigger processor job failed");
                            backoff(self.retry_timeout).await;
                        }
                        Ok(()) => delay(self.delay_timeout).await,
                    }
                }
            }
        }
    }
}
