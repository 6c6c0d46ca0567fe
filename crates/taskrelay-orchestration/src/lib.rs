//! # taskrelay-orchestration
//!
//! Everything above the four pipeline workers (spec §4.4-§4.6): staging and
//! bounding concurrent worker futures (`Scheduler`), persisting/reloading
//! topic contents across a process lifetime (`QueueStateService`), ordered
//! startup/main/shutdown phases (`Lifecycle`), and the assembly that wires
//! `Settings` into all of the above (`Application`).

pub mod application;
pub mod error;
pub mod lifecycle;
pub mod queue_state;
pub mod scheduler;

pub use application::Application;
pub use error::{ApplicationError, ApplicationFailedJobsError, ApplicationTimeoutError, OrchestrationError, ShutdownError, StartupError};
pub use lifecycle::{Lifecycle, LifecycleCallback};
pub use queue_state::QueueStateService;
pub use scheduler::{Scheduler, SchedulerError};
