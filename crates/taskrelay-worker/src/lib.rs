//! # taskrelay-worker
//!
//! The four concrete pipeline workers (spec §4.3): `TaskSpawner`,
//! `TaskProcessor`, `TriggerProcessor`, `EventProcessor`. Each owns a
//! shared reference to the queue/state repositories and registry it needs;
//! none of them own their own scheduling — that's `taskrelay-orchestration`'s
//! job, which spawns `N` of each `Repeatable` worker and one `TaskSpawner`.

pub mod base;
pub mod error;
mod workers;

pub use base::route_outcome;
pub use error::WorkerError;
pub use workers::{EventProcessor, TaskProcessor, TaskSpawner, TriggerProcessor};
