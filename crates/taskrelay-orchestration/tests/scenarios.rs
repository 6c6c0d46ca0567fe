//! Integration-level scenario tests (spec §8 S1-S7), constructing a full
//! `Application` against fake trigger/action plugins registered for the
//! test only, per SPEC_FULL.md §10.4.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use taskrelay_orchestration::{Application, ApplicationError};
use taskrelay_shared::config::settings::{
    AppSettings, ConfigBackendSettings, LogSettings, QueueBackendSettings, QueueStateMode, SchedulerSettings,
    StateBackendSettings, TasksSettings, WorkerSettings,
};
use taskrelay_shared::{ActionProcessor, Event, PluginSpec, ProcessingError, Registry, Settings};
use taskrelay_state::StateAcquisition;

fn worker_settings(max_retries: u32) -> WorkerSettings {
    WorkerSettings {
        count: 1,
        max_retries,
        queue_state_mode: QueueStateMode::Ignore,
        failed_queue_state_mode: QueueStateMode::Ignore,
        delay_timeout_ms: 1,
        retry_timeout_ms: 1,
    }
}

async fn write_tasks_yaml(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("tasks.yaml");
    tokio::fs::write(&path, body).await.unwrap();
    path
}

fn base_settings(tasks_yaml: std::path::PathBuf, state_dir: std::path::PathBuf) -> Settings {
    Settings {
        app: AppSettings::default(),
        logs: LogSettings::default(),
        tasks: TasksSettings {
            config_backend: ConfigBackendSettings {
                backend_type: "yaml_file".into(),
                path: tasks_yaml.display().to_string(),
            },
            queue_backend: QueueBackendSettings {
                backend_type: "memory".into(),
            },
            state_backend: StateBackendSettings {
                backend_type: "local_dir".into(),
                path: state_dir.display().to_string(),
            },
            scheduler: SchedulerSettings {
                limit: 8,
                pending_limit: 0,
                timeout: 0,
                close_timeout: 2,
            },
            task_processor: worker_settings(3),
            trigger_processor: worker_settings(3),
            event_processor: worker_settings(3),
        },
    }
}

struct FiniteTrigger {
    events: Vec<Event>,
    state: StateAcquisition,
}

#[async_trait]
impl taskrelay_shared::TriggerProcessor for FiniteTrigger {
    fn produce_events(&mut self) -> BoxStream<'_, Result<Event, ProcessingError>> {
        stream::iter(self.events.drain(..).map(Ok)).boxed()
    }

    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError> {
        self.state.commit(serde_json::json!({"done": true})).await?;
        Ok(())
    }
}

struct ForeverTrigger {
    state: StateAcquisition,
}

#[async_trait]
impl taskrelay_shared::TriggerProcessor for ForeverTrigger {
    fn produce_events(&mut self) -> BoxStream<'_, Result<Event, ProcessingError>> {
        stream::repeat(()).map(|_| {
            Ok(Event {
                id: "forever".into(),
                title: "t".into(),
                body: "b".into(),
                url: "u".into(),
            })
        }).boxed()
    }

    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError> {
        self.state.commit(serde_json::json!({"done": true})).await?;
        Ok(())
    }
}

struct RecordingAction(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl ActionProcessor for RecordingAction {
    async fn process(&mut self, event: &Event) -> Result<(), ProcessingError> {
        self.0.lock().unwrap().push(event.id.clone());
        Ok(())
    }

    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError> {
        Ok(())
    }
}

struct FlakyAction {
    attempts: Arc<AtomicUsize>,
    fail_until: usize,
}

#[async_trait]
impl ActionProcessor for FlakyAction {
    async fn process(&mut self, _event: &Event) -> Result<(), ProcessingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_until {
            return Err(ProcessingError::msg("flaky action deliberately failed"));
        }
        Ok(())
    }

    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError> {
        Ok(())
    }
}

fn register_finite_trigger(registry: &mut Registry, events: Vec<Event>) {
    registry.register_trigger(
        "finite",
        Arc::new(move |_spec: &PluginSpec, state: StateAcquisition| {
            Ok(Box::new(FiniteTrigger { events: events.clone(), state }) as Box<dyn taskrelay_shared::TriggerProcessor>)
        }),
    );
}

fn register_forever_trigger(registry: &mut Registry) {
    registry.register_trigger(
        "forever",
        Arc::new(|_spec: &PluginSpec, state: StateAcquisition| {
            Ok(Box::new(ForeverTrigger { state }) as Box<dyn taskrelay_shared::TriggerProcessor>)
        }),
    );
}

fn register_recording_action(registry: &mut Registry, recorded: Arc<Mutex<Vec<String>>>) {
    registry.register_action(
        "record",
        Arc::new(move |_spec: &PluginSpec| Ok(Box::new(RecordingAction(recorded.clone())) as Box<dyn ActionProcessor>)),
    );
}

fn register_flaky_action(registry: &mut Registry, attempts: Arc<AtomicUsize>, fail_until: usize) {
    registry.register_action(
        "flaky",
        Arc::new(move |_spec: &PluginSpec| {
            Ok(Box::new(FlakyAction {
                attempts: attempts.clone(),
                fail_until,
            }) as Box<dyn ActionProcessor>)
        }),
    );
}

#[tokio::test]
async fn s1_empty_config_drains_immediately_and_exits_clean() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(dir.path(), "tasks: []\n").await;
    let settings = base_settings(tasks_yaml, dir.path().join("state"));

    let app = Application::new(settings, Registry::with_default_secrets()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn s2_single_task_no_events_produces_one_trigger_job_and_zero_event_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: finite\n        id: Tr\n    actions:\n      - type: record\n        id: a\n",
    )
    .await;
    let settings = base_settings(tasks_yaml, dir.path().join("state"));

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::with_default_secrets();
    register_finite_trigger(&mut registry, vec![]);
    register_recording_action(&mut registry, recorded.clone());

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert!(result.is_ok());
    assert!(recorded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn s3_fan_out_produces_every_event_action_combination() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: finite\n        id: Tr\n    actions:\n      - type: record\n        id: a\n      - type: record\n        id: b\n",
    )
    .await;
    let settings = base_settings(tasks_yaml, dir.path().join("state"));

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::with_default_secrets();
    register_finite_trigger(
        &mut registry,
        vec![
            Event { id: "e1".into(), title: "t".into(), body: "b".into(), url: "u".into() },
            Event { id: "e2".into(), title: "t".into(), body: "b".into(), url: "u".into() },
        ],
    );
    register_recording_action(&mut registry, recorded.clone());

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert!(result.is_ok());

    let mut seen = recorded.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["e1".to_string(), "e1".to_string(), "e2".to_string(), "e2".to_string()]);
}

#[tokio::test]
async fn s4_retry_then_success_leaves_failed_topic_empty() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: finite\n        id: Tr\n    actions:\n      - type: flaky\n        id: a\n",
    )
    .await;
    let settings = base_settings(tasks_yaml, dir.path().join("state"));

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::with_default_secrets();
    register_finite_trigger(
        &mut registry,
        vec![Event { id: "e1".into(), title: "t".into(), body: "b".into(), url: "u".into() }],
    );
    register_flaky_action(&mut registry, attempts.clone(), 1);

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s5_retry_exhaustion_lands_in_failed_topic_and_reports_failed_jobs_error() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: finite\n        id: Tr\n    actions:\n      - type: flaky\n        id: a\n",
    )
    .await;
    let mut settings = base_settings(tasks_yaml, dir.path().join("state"));
    settings.tasks.event_processor = worker_settings(2);

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::with_default_secrets();
    register_finite_trigger(
        &mut registry,
        vec![Event { id: "e1".into(), title: "t".into(), body: "b".into(), url: "u".into() }],
    );
    register_flaky_action(&mut registry, attempts.clone(), usize::MAX);

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(matches!(result.unwrap_err(), ApplicationError::FailedJobs(_)));
}

#[tokio::test]
async fn s6_restart_continuity_reloads_failed_event_with_reset_retry_count() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: finite\n        id: Tr\n    actions:\n      - type: flaky\n        id: a\n",
    )
    .await;

    let mut first_settings = base_settings(tasks_yaml.clone(), state_dir.clone());
    first_settings.tasks.event_processor = WorkerSettings {
        queue_state_mode: QueueStateMode::Load,
        failed_queue_state_mode: QueueStateMode::LoadRestart,
        max_retries: 2,
        ..worker_settings(2)
    };

    let first_attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::with_default_secrets();
    register_finite_trigger(
        &mut registry,
        vec![Event { id: "e1".into(), title: "t".into(), body: "b".into(), url: "u".into() }],
    );
    register_flaky_action(&mut registry, first_attempts.clone(), usize::MAX);

    let app = Application::new(first_settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.start()).await.unwrap();
    assert!(matches!(result.unwrap_err(), ApplicationError::FailedJobs(_)));
    assert_eq!(first_attempts.load(Ordering::SeqCst), 2);

    // Second run: same state dir, trigger now produces zero new events (the
    // task is OncePerRun so it runs again), but the previously-failed event
    // should reload into EVENT with retry_count reset and get attempted again.
    let mut second_settings = base_settings(tasks_yaml, state_dir);
    second_settings.tasks.event_processor = WorkerSettings {
        queue_state_mode: QueueStateMode::Load,
        failed_queue_state_mode: QueueStateMode::LoadRestart,
        max_retries: 2,
        ..worker_settings(2)
    };

    let second_attempts = Arc::new(AtomicUsize::new(0));
    let mut registry2 = Registry::with_default_secrets();
    register_finite_trigger(&mut registry2, vec![]);
    register_flaky_action(&mut registry2, second_attempts.clone(), 0);

    let app2 = Application::new(second_settings, registry2).unwrap();
    let result2 = tokio::time::timeout(Duration::from_secs(5), app2.start()).await.unwrap();
    assert!(result2.is_ok());
    assert!(second_attempts.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn s7_scheduler_timeout_reports_application_timeout_error() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: forever\n        id: Tr\n    actions:\n      - type: record\n        id: a\n",
    )
    .await;
    let mut settings = base_settings(tasks_yaml, dir.path().join("state"));
    settings.tasks.scheduler.timeout = 1;
    settings.tasks.scheduler.close_timeout = 1;

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::with_default_secrets();
    register_forever_trigger(&mut registry);
    register_recording_action(&mut registry, recorded.clone());

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), app.start()).await.unwrap();
    assert!(matches!(result.unwrap_err(), ApplicationError::Timeout(_)));
}

/// Like `s7`, but with `queue_state_mode=Load` on the trigger processor
/// instead of `Ignore`: shutdown's queue-state dump must `close_topic` +
/// drain `TRIGGER` to `FINISHED` after `Scheduler::dispose` aborts the
/// straggler still holding its acquisition mid-`process_trigger`. That
/// straggler's acquisition drops without an explicit `consume`/`release`;
/// if the item it holds weren't returned and its in-flight slot cleared,
/// `TRIGGER` could never reach `FINISHED` and this dump would hang forever
/// instead of completing within the outer timeout.
#[tokio::test]
async fn s7_dispose_straggler_still_lets_shutdown_drain_its_topic() {
    let dir = tempfile::tempdir().unwrap();
    let tasks_yaml = write_tasks_yaml(
        dir.path(),
        "tasks:\n  - id: T\n    triggers:\n      - type: forever\n        id: Tr\n    actions:\n      - type: record\n        id: a\n",
    )
    .await;
    let mut settings = base_settings(tasks_yaml, dir.path().join("state"));
    settings.tasks.scheduler.timeout = 1;
    settings.tasks.scheduler.close_timeout = 1;
    settings.tasks.trigger_processor = WorkerSettings {
        queue_state_mode: QueueStateMode::Load,
        failed_queue_state_mode: QueueStateMode::Load,
        ..worker_settings(3)
    };

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::with_default_secrets();
    register_forever_trigger(&mut registry);
    register_recording_action(&mut registry, recorded.clone());

    let app = Application::new(settings, registry).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), app.start()).await.unwrap();
    assert!(matches!(result.unwrap_err(), ApplicationError::Timeout(_)));
}
