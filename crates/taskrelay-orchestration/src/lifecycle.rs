//! Ordered startup/main/shutdown phases (spec §4.6).
//!
//! Startup callbacks run in registration order and abort the whole
//! application at the first failure. Shutdown callbacks run in *reverse*
//! registration order (so the last thing started is the first thing torn
//! down) and always run to completion, collecting every failure instead of
//! stopping at the first one. Main tasks race each other via
//! `FuturesUnordered`; `run` returns as soon as any one of them completes or
//! errors, since in this pipeline that always means either the drain loop
//! finished or a worker died unexpectedly.

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::error::{ShutdownError, StartupError};

pub type LifecycleAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send>;
pub type MainTask = BoxFuture<'static, Result<(), anyhow::Error>>;

pub struct LifecycleCallback {
    pub name: String,
    action: LifecycleAction,
}

impl LifecycleCallback {
    pub fn new(name: impl Into<String>, action: LifecycleAction) -> Self {
        Self { name: name.into(), action }
    }
}

#[derive(Default)]
pub struct Lifecycle {
    startup: Vec<LifecycleCallback>,
    main_tasks: Vec<MainTask>,
    shutdown: Vec<LifecycleCallback>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&mut self, callback: LifecycleCallback) {
        self.startup.push(callback);
    }

    pub fn on_main(&mut self, task: MainTask) {
        self.main_tasks.push(task);
    }

    /// Registered in the order shutdown should happen in (last-started,
    /// first-stopped is the caller's responsibility; this just runs them in
    /// the order handed to it, reversed at the point `run_shutdown` is
    /// called).
    pub fn on_shutdown(&mut self, callback: LifecycleCallback) {
        self.shutdown.push(callback);
    }

    /// Run every startup callback in order, stopping at the first failure.
    pub async fn run_startup(&mut self) -> Result<(), StartupError> {
        for callback in self.startup.drain(..) {
            let name = callback.name.clone();
            (callback.action)()
                .await
                .map_err(|source| StartupError { callback: name, source })?;
        }
        Ok(())
    }

    /// Await every main task concurrently; return on the first completion
    /// (success or error).
    pub async fn run_main(&mut self) -> Result<(), anyhow::Error> {
        let mut tasks: FuturesUnordered<MainTask> = self.main_tasks.drain(..).collect();
        match tasks.next().await {
            Some(result) => result,
            None => Ok(()),
        }
    }

    /// Run every shutdown callback in reverse-registration order,
    /// collecting rather than stopping at the first failure.
    pub async fn run_shutdown(&mut self) -> Result<(), ShutdownError> {
        let mut failures = Vec::new();
        for callback in self.shutdown.drain(..).rev() {
            if let Err(err) = (callback.action)().await {
                failures.push((callback.name, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }
}
