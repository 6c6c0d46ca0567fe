use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Opaque, registry-resolved plugin configuration (spec §3, §6.5).
///
/// `TriggerConfig`, `ActionConfig`, and the secret config variants are all
/// the same shape to the core: a `type` discriminator the [`crate::registry::Registry`]
/// uses to pick a factory, an `id` unique within its enclosing scope, and a
/// bag of parameters the core never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

pub type TriggerConfig = PluginSpec;
pub type ActionConfig = PluginSpec;

impl PluginSpec {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// `id` strings are restricted to `[a-zA-Z0-9_\-=/]` (spec §6.4).
pub fn validate_id(id: &str) -> Result<(), ConfigError> {
    if !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '=' | '/'))
    {
        Ok(())
    } else {
        Err(ConfigError::InvalidId { id: id.to_string() })
    }
}

/// Validates uniqueness and charset of every spec's `id` within `scope`.
pub fn validate_unique_ids<'a>(
    specs: impl IntoIterator<Item = &'a PluginSpec>,
    scope: &str,
) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        validate_id(&spec.id)?;
        if !seen.insert(spec.id.clone()) {
            return Err(ConfigError::DuplicateId {
                id: spec.id.clone(),
                scope: scope.to_string(),
            });
        }
    }
    Ok(())
}
