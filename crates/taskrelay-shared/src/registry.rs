//! Name -> (config schema, processor factory) maps for trigger/action/secret
//! plugins (spec §2, §9 "global registries"). Modeled as an explicit object
//! threaded through construction rather than process-global state, so tests
//! stay independent of each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ConfigError;
use crate::model::PluginSpec;
use crate::plugins::{ActionProcessor, SecretResolver, TriggerProcessor};

pub type TriggerFactory = Arc<
    dyn Fn(&PluginSpec, taskrelay_state::StateAcquisition) -> Result<Box<dyn TriggerProcessor>, ConfigError>
        + Send
        + Sync,
>;

pub type ActionFactory =
    Arc<dyn Fn(&PluginSpec) -> Result<Box<dyn ActionProcessor>, ConfigError> + Send + Sync>;

pub type SecretFactory =
    Arc<dyn Fn(&PluginSpec) -> Result<Box<dyn SecretResolver>, ConfigError> + Send + Sync>;

/// Process-scoped (but explicitly owned, not global) plugin registry.
#[derive(Clone, Default)]
pub struct Registry {
    triggers: HashMap<String, TriggerFactory>,
    actions: HashMap<String, ActionFactory>,
    secrets: HashMap<String, SecretFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("triggers", &self.triggers.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the two default secret backends registered, as every
    /// deployment gets them unconditionally (spec §3).
    pub fn with_default_secrets() -> Self {
        let mut registry = Self::new();
        registry.register_secret("plain", Arc::new(|spec: &PluginSpec| {
            let value = spec
                .param_str("value")
                .ok_or_else(|| ConfigError::MissingField("value".to_string()))?
                .to_string();
            Ok(Box::new(PlainSecret(value)) as Box<dyn SecretResolver>)
        }));
        registry.register_secret("env", Arc::new(|spec: &PluginSpec| {
            let key = spec
                .param_str("key")
                .ok_or_else(|| ConfigError::MissingField("key".to_string()))?
                .to_string();
            Ok(Box::new(EnvSecret(key)) as Box<dyn SecretResolver>)
        }));
        registry
    }

    pub fn register_trigger(&mut self, kind: impl Into<String>, factory: TriggerFactory) {
        self.triggers.insert(kind.into(), factory);
    }

    pub fn register_action(&mut self, kind: impl Into<String>, factory: ActionFactory) {
        self.actions.insert(kind.into(), factory);
    }

    pub fn register_secret(&mut self, kind: impl Into<String>, factory: SecretFactory) {
        self.secrets.insert(kind.into(), factory);
    }

    pub fn build_trigger(
        &self,
        spec: &PluginSpec,
        state: taskrelay_state::StateAcquisition,
    ) -> Result<Box<dyn TriggerProcessor>, ConfigError> {
        let factory = self
            .triggers
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                kind: spec.kind.clone(),
                registry: "trigger",
            })?;
        factory(spec, state)
    }

    pub fn build_action(&self, spec: &PluginSpec) -> Result<Box<dyn ActionProcessor>, ConfigError> {
        let factory = self
            .actions
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                kind: spec.kind.clone(),
                registry: "action",
            })?;
        factory(spec)
    }

    /// Build and resolve a secret, registering its resolved value with
    /// `redaction` so it never appears verbatim in a log line (spec §10.1).
    pub async fn resolve_secret(
        &self,
        spec: &PluginSpec,
        redaction: &crate::logging::RedactionSet,
    ) -> Result<String, ConfigError> {
        let factory = self
            .secrets
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                kind: spec.kind.clone(),
                registry: "secret",
            })?;
        let resolver = factory(spec)?;
        let value = resolver.value().await?;
        redaction.register(value.clone());
        Ok(value)
    }
}

struct PlainSecret(String);

#[async_trait]
impl SecretResolver for PlainSecret {
    async fn value(&self) -> Result<String, ConfigError> {
        Ok(self.0.clone())
    }
}

struct EnvSecret(String);

#[async_trait]
impl SecretResolver for EnvSecret {
    async fn value(&self) -> Result<String, ConfigError> {
        std::env::var(&self.0).map_err(|_| ConfigError::MissingSecret(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_secret_resolves_literal() {
        let registry = Registry::with_default_secrets();
        let redaction = crate::logging::RedactionSet::new();
        let spec = PluginSpec {
            kind: "plain".into(),
            id: "s1".into(),
            params: serde_json::json!({"value": "shh"}).as_object().unwrap().clone(),
        };
        let value = registry.resolve_secret(&spec, &redaction).await.unwrap();
        assert_eq!(value, "shh");
        assert_eq!(redaction.redact("token is shh here"), "token is [REDACTED] here");
    }

    #[tokio::test]
    async fn env_secret_fails_when_unset() {
        let registry = Registry::with_default_secrets();
        let redaction = crate::logging::RedactionSet::new();
        let spec = PluginSpec {
            kind: "env".into(),
            id: "s1".into(),
            params: serde_json::json!({"key": "TASKRELAY_TEST_DOES_NOT_EXIST_XYZ"})
                .as_object()
                .unwrap()
                .clone(),
        };
        assert!(registry.resolve_secret(&spec, &redaction).await.is_err());
    }

    #[test]
    fn unknown_trigger_kind_errors() {
        let registry = Registry::new();
        let spec = PluginSpec {
            kind: "nope".into(),
            id: "t1".into(),
            params: Default::default(),
        };
        // Can't easily construct a StateAcquisition here without the state
        // crate's test helpers; build_action has the same lookup miss path
        // and is cheaper to exercise.
        let err = registry.build_action(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlugin { .. }));
    }
}
