//! Thin assembly crate: loads `.env`, loads `Settings`, builds the default
//! `Registry`, and hands both to `taskrelay_orchestration::Application`. All
//! real logic lives in the `crates/` workspace members.

use taskrelay_orchestration::{Application, ApplicationError};
use taskrelay_shared::{config::settings::load_settings, Registry, Settings};

/// Build the `Registry` this binary ships with. No external trigger/action
/// plugins are wired in by default; deployments embedding their own plugin
/// set would construct their own `Registry` and call into
/// `taskrelay-orchestration` directly instead of going through this crate.
pub fn default_registry() -> Registry {
    Registry::with_default_secrets()
}

pub fn load_application_settings() -> Result<Settings, taskrelay_shared::ConfigError> {
    load_settings()
}

pub async fn run() -> Result<(), ApplicationError> {
    let settings = load_application_settings()?;
    taskrelay_shared::logging::init(&settings.logs)?;
    let registry = default_registry();
    let app = Application::new(settings, registry)?;
    app.start().await
}
