//! Shared retry/failed-routing logic for the three `Repeatable` processors
//! (spec §4.3.5). `TaskSpawner` doesn't use this: it has no per-job retry
//! loop of its own, only the `OneShot` `max_retries`/`retry_timeout`
//! envelope around its single whole-process attempt.

use std::time::Duration;

use taskrelay_queue::{Acquisition, QueueRepository};
use taskrelay_shared::{Job, ProcessingError};

use crate::error::WorkerError;

/// Apply spec §4.3.5's outcome routing to one processed job, consuming its
/// acquisition exactly once regardless of outcome:
/// - success: `consume`.
/// - failure, retries remain: push a retry copy back to `topic`, `consume`
///   the original, and re-raise.
/// - failure, retries exhausted: push to `failed_topic`, `consume` the
///   original, and re-raise.
pub async fn route_outcome(
    queue: &dyn QueueRepository<Job>,
    topic: &str,
    failed_topic: &str,
    max_retries: u32,
    acquisition: Acquisition<Job>,
    outcome: Result<(), ProcessingError>,
) -> Result<(), WorkerError> {
    match outcome {
        Ok(()) => {
            queue.consume(topic, acquisition).await?;
            Ok(())
        }
        Err(err) => {
            let job = acquisition.item().clone();
            if job.retry_count + 1 < max_retries as u64 {
                queue.push(topic, job.retry_copy(), false).await?;
            } else {
                queue.push(failed_topic, job, false).await?;
            }
            queue.consume(topic, acquisition).await?;
            Err(WorkerError::Processing(err))
        }
    }
}

/// `FAILED_WAITING` backoff after a failed iteration (spec §4.7).
pub async fn backoff(retry_timeout: Duration) {
    tokio::time::sleep(retry_timeout).await;
}

/// Pause between successful `Repeatable` iterations (spec §4.3's
/// `delay_timeout`). Skipped on failure, where [`backoff`]'s `retry_timeout`
/// already paces the next attempt.
pub async fn delay(delay_timeout: Duration) {
    tokio::time::sleep(delay_timeout).await;
}
