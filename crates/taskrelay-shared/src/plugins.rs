//! Plugin contracts the core calls through but never implements beyond the
//! two default secret backends (spec §6.5). Concrete trigger/action/secret
//! implementations are external collaborators; only the traits they satisfy
//! live here.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::ProcessingError;
use crate::model::Event;

/// A configured source of change events against an external system, with a
/// durable incremental cursor held in the `taskrelay_state::StateAcquisition`
/// it was constructed with.
///
/// `dispose` takes `self: Box<Self>` because disposal is the point at which
/// an implementation commits its final cursor back to the state handle it
/// owns — it is a consuming operation, not a reusable one.
#[async_trait]
pub trait TriggerProcessor: Send {
    /// A (possibly unbounded) stream of events. The trigger processor
    /// worker drains this fully before disposing.
    fn produce_events(&mut self) -> BoxStream<'_, Result<Event, ProcessingError>>;

    /// Commit any durable cursor state and release owned resources.
    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError>;
}

/// A configured sink that delivers an event to a destination.
#[async_trait]
pub trait ActionProcessor: Send {
    async fn process(&mut self, event: &Event) -> Result<(), ProcessingError>;

    async fn dispose(self: Box<Self>) -> Result<(), ProcessingError>;
}

/// Resolves a secret's value, e.g. from a literal or an environment
/// variable. Two implementations ship with the core (`plain`, `env`);
/// anything more elaborate (vault, KMS) is a plugin a deployment registers
/// itself (spec §3, §6.5).
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn value(&self) -> Result<String, crate::errors::ConfigError>;
}
