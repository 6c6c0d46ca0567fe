//! Cooperative task host (spec §4.5): stages worker futures, starts them
//! bounded by `limit` concurrently-running and `pending_limit`
//! awaiting-admission, and disposes of them within a grace period.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// A hosted unit of work. Workers report their own failures via logging;
/// the scheduler only tracks whether they are still running.
pub type SchedulerJob = BoxFuture<'static, ()>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler pending limit exceeded")]
    PendingLimitExceeded,
    #[error("scheduler task failed to join: {0}")]
    JoinFailed(String),
}

pub struct Scheduler {
    pending_limit: usize,
    semaphore: Arc<Semaphore>,
    deferred: Mutex<Vec<SchedulerJob>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// `limit` bounds concurrently running jobs; `pending_limit` bounds how
    /// many may be staged via `defer` before `spawn_deferred` drains them
    /// (`0` means unbounded, per spec §4.5).
    pub fn new(limit: usize, pending_limit: usize) -> Self {
        Self {
            pending_limit,
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            deferred: Mutex::new(Vec::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Stage `job` for a later `spawn_deferred`, without starting it.
    pub async fn defer(&self, job: SchedulerJob) -> Result<(), SchedulerError> {
        let mut deferred = self.deferred.lock().await;
        if self.pending_limit > 0 && deferred.len() >= self.pending_limit {
            return Err(SchedulerError::PendingLimitExceeded);
        }
        deferred.push(job);
        Ok(())
    }

    /// Start every job staged via `defer`, concurrently.
    pub async fn spawn_deferred(&self) {
        let jobs = {
            let mut deferred = self.deferred.lock().await;
            std::mem::take(&mut *deferred)
        };
        for job in jobs {
            self.spawn(job).await;
        }
    }

    /// Start `job` now.
    pub async fn spawn(&self, job: SchedulerJob) {
        let semaphore = self.semaphore.clone();
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("scheduler semaphore is never closed");
            job.await;
        });
    }

    /// True iff zero jobs are currently running.
    ///
    /// A `JoinSet` only drops a finished task once something joins it, so
    /// this opportunistically reaps everything already finished before
    /// checking: otherwise a completed worker would linger in the set
    /// forever and the drain loop (spec §4.6) would never observe quiescence.
    pub async fn is_empty(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "scheduler task panicked");
                }
            }
        }
        tasks.is_empty()
    }

    /// Await orderly completion of every hosted job within `close_timeout`;
    /// whatever is still running past that deadline is cancelled. A
    /// `JoinError` caused by that cancellation is swallowed; any other
    /// join failure is reported.
    pub async fn dispose(&self, close_timeout: Duration) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock().await;
        let sleep = tokio::time::sleep(close_timeout);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                next = tasks.join_next() => {
                    match next {
                        None => return Ok(()),
                        Some(Ok(())) => continue,
                        Some(Err(e)) if e.is_cancelled() => continue,
                        Some(Err(e)) => return Err(SchedulerError::JoinFailed(e.to_string())),
                    }
                }
                _ = &mut sleep => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn spawned_jobs_run_and_empty_out() {
        let scheduler = Scheduler::new(4, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            scheduler
                .spawn(Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .await;
        }
        scheduler.dispose(Duration::from_secs(1)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn defer_then_spawn_deferred_runs_all() {
        let scheduler = Scheduler::new(2, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = counter.clone();
            scheduler
                .defer(Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .await
                .unwrap();
        }
        scheduler.spawn_deferred().await;
        scheduler.dispose(Duration::from_secs(1)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn pending_limit_rejects_excess_deferrals() {
        let scheduler = Scheduler::new(1, 1);
        scheduler.defer(Box::pin(async {})).await.unwrap();
        assert!(matches!(
            scheduler.defer(Box::pin(async {})).await,
            Err(SchedulerError::PendingLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn is_empty_reaps_finished_jobs_without_dispose() {
        let scheduler = Scheduler::new(4, 0);
        scheduler.spawn(Box::pin(async {})).await;
        // Give the spawned task a chance to actually finish before polling;
        // is_empty() must reap it on its own, with no call to dispose().
        for _ in 0..50 {
            if scheduler.is_empty().await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("scheduler never reported empty after its only job finished");
    }

    #[tokio::test]
    async fn dispose_cancels_stragglers_past_close_timeout() {
        let scheduler = Scheduler::new(4, 0);
        scheduler
            .spawn(Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }))
            .await;
        let result = scheduler.dispose(Duration::from_millis(20)).await;
        assert!(result.is_ok());
        assert!(scheduler.is_empty().await);
    }
}
