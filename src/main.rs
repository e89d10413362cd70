//! Job-posting risk engine: binary entrypoint.
//! Boots the Axum HTTP server with the rule set from `RULES_CONFIG_PATH`.

use job_risk_engine::config::{EngineSettings, LogFormat};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the process subscriber. shuttle-runtime is built without its own
/// `setup-tracing` subscriber, so this one owns filtering and format.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("job_risk_engine=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let settings = EngineSettings::from_env()?;
    init_tracing(settings.log_format);

    let router = job_risk_engine::app_with(settings)?;
    Ok(router.into())
}
