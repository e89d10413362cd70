use shuttle_axum::axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const POSTINGS_SCORED_TOTAL: &str = "risk_postings_scored_total";
pub const SCORING_FAILURES_TOTAL: &str = "risk_scoring_failures_total";
pub const SCORING_BATCH_MS: &str = "risk_scoring_batch_ms";
pub const RULES_RELOADS_TOTAL: &str = "risk_rules_reloads_total";
pub const RULES_KEYWORDS: &str = "risk_rules_keywords";

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. The global recorder can only be set once per
    /// process, so later calls (tests building several apps) share the first handle.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(POSTINGS_SCORED_TOTAL, "Postings successfully scored.");
    describe_counter!(
        SCORING_FAILURES_TOTAL,
        "Postings skipped by a scoring run, labelled by failing stage."
    );
    describe_histogram!(SCORING_BATCH_MS, "Wall time of one batch scoring run in milliseconds.");
    describe_counter!(
        RULES_RELOADS_TOTAL,
        "Rule file reload attempts, labelled by outcome."
    );
    describe_gauge!(RULES_KEYWORDS, "Keywords in the active dictionary.");
}
