//! `TaskSpawner` (spec §4.3.1): `OneShot`, `count=1`, the sole producer for
//! `TASK`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskrelay_queue::{topics, QueueRepository};
use taskrelay_shared::{ConfigRepository, Job, TaskConfig, TaskKind};
use taskrelay_state::StateRepository;

use crate::error::WorkerError;

fn state_path(task_id: &str) -> String {
    format!("tasks/{task_id}/state")
}

async fn read_last_run(
    state: &dyn StateRepository,
    task_id: &str,
) -> Result<Option<DateTime<Utc>>, WorkerError> {
    let value = state.get(&state_path(task_id)).await?;
    match value {
        None => Ok(None),
        Some(value) => {
            let parsed: taskrelay_shared::CronTaskState = serde_json::from_value(value)
                .map_err(taskrelay_shared::ConfigError::from)?;
            Ok(parsed.last_run)
        }
    }
}

async fn write_last_run(state: &dyn StateRepository, task_id: &str, now: DateTime<Utc>) -> Result<(), WorkerError> {
    let value = serde_json::to_value(taskrelay_shared::CronTaskState { last_run: Some(now) })
        .expect("CronTaskState always serializes");
    state.set(&state_path(task_id), value).await?;
    Ok(())
}

fn is_ready(task: &TaskConfig, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<bool, WorkerError> {
    match &task.kind {
        TaskKind::OncePerRun => Ok(true),
        TaskKind::Cron { schedule } => Ok(taskrelay_shared::cron::is_ready(schedule, last_run, now)?),
    }
}

/// Reads the task list once, enqueues one `TaskJob` per ready task, and
/// closes `TASK`. Wrapped in the `OneShot` `max_retries`/`retry_timeout`
/// envelope: a failure anywhere in `process_once` retries the *whole*
/// attempt, not an individual task.
pub struct TaskSpawner {
    config: Arc<ConfigRepository>,
    state: Arc<dyn StateRepository>,
    queue: Arc<dyn QueueRepository<Job>>,
    max_retries: u32,
    retry_timeout: Duration,
}

impl TaskSpawner {
    pub fn new(
        config: Arc<ConfigRepository>,
        state: Arc<dyn StateRepository>,
        queue: Arc<dyn QueueRepository<Job>>,
        max_retries: u32,
        retry_timeout: Duration,
    ) -> Self {
        Self {
            config,
            state,
            queue,
            max_retries,
            retry_timeout,
        }
    }

    async fn process_once(&self) -> Result<(), WorkerError> {
        let root = self.config.get_config().await?;
        let now = Utc::now();
        for task in root.tasks {
            let last_run = match &task.kind {
                TaskKind::Cron { .. } => read_last_run(self.state.as_ref(), &task.id).await?,
                TaskKind::OncePerRun => None,
            };
            if !is_ready(&task, last_run, now)? {
                continue;
            }
            let job = Job::task(task.id.clone(), task.clone());
            self.queue.push(topics::TASK, job, true).await?;
            if matches!(task.kind, TaskKind::Cron { .. }) {
                write_last_run(self.state.as_ref(), &task.id, now).await?;
            }
            tracing::debug!(task_id = %task.id, "task spawned");
        }
        self.queue.close_topic(topics::TASK).await;
        tracing::info!("task spawner finished, TASK closed");
        Ok(())
    }

    pub async fn run(&self) -> Result<(), WorkerError> {
        let mut attempt = 0u32;
        loop {
            match self.process_once().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "task spawner attempt failed");
                    if attempt >= self.max_retries {
                        tracing::error!(error = %err, "task spawner exhausted retries");
                        return Err(err);
                    }
                    tokio::time::sleep(self.retry_timeout).await;
                }
            }
        }
    }
}
