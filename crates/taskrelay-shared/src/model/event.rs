use serde::{Deserialize, Serialize};

/// An immutable change event produced by a trigger (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque, unique per trigger run.
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
}
