//! Wires `Settings` into running repositories, a `Registry`, a `Scheduler`,
//! three `QueueStateService` pairs, and a `Lifecycle`, then drives the whole
//! thing to completion (spec §2, §4.6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use taskrelay_queue::{topics, InMemoryQueueRepository, QueueRepository};
use taskrelay_shared::{ConfigRepository, Job, Registry, Settings};
use taskrelay_state::{LocalDirStateRepository, StateRepository};
use taskrelay_worker::{EventProcessor, TaskProcessor, TaskSpawner, TriggerProcessor};

use crate::error::{ApplicationError, ApplicationFailedJobsError, ApplicationTimeoutError};
use crate::lifecycle::{Lifecycle, LifecycleCallback};
use crate::queue_state::QueueStateService;
use crate::scheduler::Scheduler;

/// `TaskSpawner` has no YAML-configurable retry knobs (spec §6.2 only lists
/// them for the three `Repeatable` workers); these cover its own `OneShot`
/// envelope.
const TASK_SPAWNER_MAX_RETRIES: u32 = 3;
const TASK_SPAWNER_RETRY_TIMEOUT: Duration = Duration::from_millis(500);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn build_queue(backend_type: &str) -> Result<Arc<dyn QueueRepository<Job>>, ApplicationError> {
    match backend_type {
        "memory" => Ok(Arc::new(InMemoryQueueRepository::new())),
        other => Err(ApplicationError::UnknownBackend {
            backend: other.to_string(),
            registry: "queue_backend",
        }),
    }
}

fn build_state(backend_type: &str, path: &str) -> Result<Arc<dyn StateRepository>, ApplicationError> {
    match backend_type {
        "local_dir" => Ok(Arc::new(LocalDirStateRepository::new(path))),
        other => Err(ApplicationError::UnknownBackend {
            backend: other.to_string(),
            registry: "state_backend",
        }),
    }
}

pub struct Application {
    settings: Settings,
    registry: Arc<Registry>,
    config: Arc<ConfigRepository>,
    queue: Arc<dyn QueueRepository<Job>>,
    state: Arc<dyn StateRepository>,
    scheduler: Arc<Scheduler>,
    queue_states: Vec<QueueStateService>,
}

impl Application {
    pub fn new(settings: Settings, registry: Registry) -> Result<Self, ApplicationError> {
        if settings.tasks.config_backend.backend_type != "yaml_file" {
            return Err(ApplicationError::UnknownBackend {
                backend: settings.tasks.config_backend.backend_type.clone(),
                registry: "config_backend",
            });
        }
        let config = Arc::new(ConfigRepository::new(&settings.tasks.config_backend.path));
        let queue = build_queue(&settings.tasks.queue_backend.backend_type)?;
        let state = build_state(
            &settings.tasks.state_backend.backend_type,
            &settings.tasks.state_backend.path,
        )?;
        let scheduler = Arc::new(Scheduler::new(
            settings.tasks.scheduler.limit,
            settings.tasks.scheduler.pending_limit,
        ));

        let queue_states = vec![
            QueueStateService::new(
                queue.clone(),
                state.clone(),
                topics::TASK,
                topics::FAILED_TASK,
                settings.tasks.task_processor.queue_state_mode,
                settings.tasks.task_processor.failed_queue_state_mode,
            ),
            QueueStateService::new(
                queue.clone(),
                state.clone(),
                topics::TRIGGER,
                topics::FAILED_TRIGGER,
                settings.tasks.trigger_processor.queue_state_mode,
                settings.tasks.trigger_processor.failed_queue_state_mode,
            ),
            QueueStateService::new(
                queue.clone(),
                state.clone(),
                topics::EVENT,
                topics::FAILED_EVENT,
                settings.tasks.event_processor.queue_state_mode,
                settings.tasks.event_processor.failed_queue_state_mode,
            ),
        ];

        Ok(Self {
            settings,
            registry: Arc::new(registry),
            config,
            queue,
            state,
            scheduler,
            queue_states,
        })
    }

    /// Run startup, spawn every worker, drive the drain loop, then run
    /// shutdown unconditionally. Returns the first fatal error in the order
    /// startup > run phase > shutdown (spec §4.6, §9).
    pub async fn start(self) -> Result<(), ApplicationError> {
        let mut lifecycle = Lifecycle::new();

        for service in self.queue_states.iter().cloned() {
            lifecycle.on_start(LifecycleCallback::new(
                format!("load-queue-state:{}", service.topic()),
                Box::new(move || Box::pin(async move { service.load().await.map_err(anyhow::Error::new) })),
            ));
        }

        self.spawn_workers().await;

        lifecycle.on_main(self.build_drain_task());
        lifecycle.on_main(Self::build_signal_task());

        for service in self.queue_states.iter().cloned() {
            lifecycle.on_shutdown(LifecycleCallback::new(
                format!("dump-queue-state:{}", service.topic()),
                Box::new(move || Box::pin(async move { service.dump().await.map_err(anyhow::Error::new) })),
            ));
        }
        let scheduler = self.scheduler.clone();
        let close_timeout = Duration::from_secs(self.settings.tasks.scheduler.close_timeout);
        lifecycle.on_shutdown(LifecycleCallback::new(
            "scheduler-dispose",
            Box::new(move || Box::pin(async move { scheduler.dispose(close_timeout).await.map_err(anyhow::Error::new) })),
        ));

        let startup_result = lifecycle.run_startup().await;
        let run_result = if startup_result.is_ok() {
            Some(lifecycle.run_main().await)
        } else {
            None
        };
        let shutdown_result = lifecycle.run_shutdown().await;

        if let Err(err) = startup_result {
            return Err(err.into());
        }
        if let Some(Err(err)) = run_result {
            if let Some(timeout) = err.downcast_ref::<ApplicationTimeoutError>() {
                return Err(ApplicationTimeoutError(timeout.0).into());
            }
            if let Some(failed) = err.downcast_ref::<ApplicationFailedJobsError>() {
                return Err(ApplicationFailedJobsError(failed.0).into());
            }
            return Err(ApplicationError::Runtime(err));
        }
        shutdown_result.map_err(ApplicationError::from)
    }

    async fn spawn_workers(&self) {
        let spawner = TaskSpawner::new(
            self.config.clone(),
            self.state.clone(),
            self.queue.clone(),
            TASK_SPAWNER_MAX_RETRIES,
            TASK_SPAWNER_RETRY_TIMEOUT,
        );
        self.scheduler
            .spawn(Box::pin(async move {
                if let Err(err) = spawner.run().await {
                    tracing::error!(error = %err, "task spawner failed");
                }
            }))
            .await;

        let task_settings = &self.settings.tasks.task_processor;
        for _ in 0..task_settings.count {
            let processor = TaskProcessor::new(
                self.queue.clone(),
                task_settings.max_retries,
                task_settings.retry_timeout(),
                task_settings.delay_timeout(),
            );
            self.scheduler.spawn(Box::pin(async move { processor.run().await })).await;
        }

        let trigger_settings = &self.settings.tasks.trigger_processor;
        for _ in 0..trigger_settings.count {
            let processor = TriggerProcessor::new(
                self.queue.clone(),
                self.state.clone(),
                self.registry.clone(),
                trigger_settings.max_retries,
                trigger_settings.retry_timeout(),
                trigger_settings.delay_timeout(),
            );
            self.scheduler.spawn(Box::pin(async move { processor.run().await })).await;
        }

        let event_settings = &self.settings.tasks.event_processor;
        for _ in 0..event_settings.count {
            let processor = EventProcessor::new(
                self.queue.clone(),
                self.registry.clone(),
                event_settings.max_retries,
                event_settings.retry_timeout(),
                event_settings.delay_timeout(),
            );
            self.scheduler.spawn(Box::pin(async move { processor.run().await })).await;
        }
    }

    /// A main task that resolves cleanly on Ctrl-C. Races the drain task
    /// (spec §4.6); whichever finishes first decides the run phase's
    /// outcome, so an interrupt during drainage ends in the very same clean
    /// shutdown path a finished drain does (spec §6.7, "0 on clean exit or
    /// keyboard interrupt").
    fn build_signal_task() -> crate::lifecycle::MainTask {
        Box::pin(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received interrupt signal, shutting down");
            Ok(())
        })
    }

    fn build_drain_task(&self) -> crate::lifecycle::MainTask {
        let queue = self.queue.clone();
        let scheduler = self.scheduler.clone();
        let timeout = self.settings.tasks.scheduler.timeout;
        Box::pin(async move {
            let started = Instant::now();
            loop {
                let drained = scheduler.is_empty().await
                    && queue.is_topic_finished(topics::TASK).await
                    && queue.is_topic_finished(topics::TRIGGER).await
                    && queue.is_topic_finished(topics::EVENT).await;
                if drained {
                    break;
                }
                if timeout > 0 && started.elapsed() >= Duration::from_secs(timeout) {
                    return Err(anyhow::Error::new(ApplicationTimeoutError(Duration::from_secs(timeout))));
                }
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }

            let failed_count = queue.peek_all(topics::FAILED_TASK).await.len()
                + queue.peek_all(topics::FAILED_TRIGGER).await.len()
                + queue.peek_all(topics::FAILED_EVENT).await.len();
            if failed_count > 0 {
                return Err(anyhow::Error::new(ApplicationFailedJobsError(failed_count)));
            }
            Ok(())
        })
    }
}
