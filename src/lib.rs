// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod crawl;
pub mod dashboard;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod posting;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::config::EngineSettings;

use anyhow::Context;
use shuttle_axum::axum::Router;
use tracing::info;

use crate::analyze::{start_hot_reload_thread, RuleSet, RulesHandle};
use crate::metrics::Metrics;

/// Load the rule file named by `settings` and build the shared state.
/// Starts the hot-reload watcher when `RULES_HOT_RELOAD=1`.
pub fn build_state(settings: EngineSettings) -> anyhow::Result<AppState> {
    let rules = RuleSet::from_path(&settings.rules_path)
        .with_context(|| format!("loading rules from {}", settings.rules_path.display()))?;
    info!(
        target: "rules",
        version = %rules.version,
        keywords = rules.dictionary.len(),
        patterns = rules.patterns.len(),
        "rules loaded"
    );
    let handle = RulesHandle::new(rules);
    if settings.hot_reload {
        start_hot_reload_thread(handle.clone(), settings.rules_path.clone());
    }
    Ok(AppState::new(handle, settings))
}

/// Full application router (API + `/metrics`) for the given settings.
pub fn app_with(settings: EngineSettings) -> anyhow::Result<Router> {
    let state = build_state(settings)?;
    let metrics = Metrics::init()?;
    Ok(router(state).merge(metrics.router()))
}

/// Same router the binary serves, configured from the environment.
pub fn app() -> anyhow::Result<Router> {
    app_with(EngineSettings::from_env()?)
}
