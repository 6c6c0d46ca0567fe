//! Structured, leveled logging init and secret redaction (spec §10.1).
//!
//! Every suspension point named in spec §5 logs through `tracing`; this
//! module only owns process-wide initialization (level/format from
//! `Settings.logs`) and the redaction set resolved secrets register with so
//! they never appear verbatim in a log line.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use crate::config::settings::LogSettings;
use crate::errors::ConfigError;

/// Tracks resolved secret values so they can be scrubbed out of any text
/// before it is logged. Registration happens once, at secret-resolution
/// time (`Registry::resolve_secret`); lookups happen on the hot log path.
#[derive(Clone, Default)]
pub struct RedactionSet(Arc<Mutex<HashSet<String>>>);

impl RedactionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() {
            self.0.lock().expect("redaction set mutex poisoned").insert(secret);
        }
    }

    /// Replace every registered secret substring in `text` with `[REDACTED]`.
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.0.lock().expect("redaction set mutex poisoned");
        let mut out = text.to_string();
        for secret in secrets.iter() {
            out = out.replace(secret.as_str(), "[REDACTED]");
        }
        out
    }
}

/// Initialize the global `tracing` subscriber from `logs.level`/`logs.format`.
///
/// Idempotent-ish: a second call after one has already installed a global
/// subscriber is a no-op (the error from `try_init` is swallowed), which
/// keeps integration tests that each build an `Application` from racing
/// each other over global subscriber state.
pub fn init(settings: &LogSettings) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&settings.level)
        .map_err(|_| ConfigError::InvalidLogFilter(settings.level.clone()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if settings.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // Already-initialized is not a startup failure; every other case here is
    // a config error the caller should surface as ConfigError.
    let _ = result;
    Ok(())
}
