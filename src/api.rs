// src/api.rs
//! REST boundary consumed by the dashboard.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::analyze::{score_batch, KeywordMatch, PatternMatch, RiskAssessment, RulesHandle};
use crate::config::EngineSettings;
use crate::crawl::{CrawlDispatcher, CrawlRequest, LoggingDispatcher};
use crate::dashboard;
use crate::error::ScoringFailure;
use crate::listing::{self, JobFilter, ListingCursor, Page};
use crate::posting::{NewPosting, Posting};
use crate::store::{AssessedPosting, AssessmentStore, UpsertKind};

const X_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");
const DEFAULT_JOBS_LIMIT: usize = 100;
const MAX_JOBS_LIMIT: usize = 1000;
const DEFAULT_HIGH_RISK_LIMIT: usize = 10;
const DEFAULT_TREND_DAYS: usize = 7;
const DEFAULT_KEYWORDS_LIMIT: usize = 20;
const OVERVIEW_TOP_SOURCES: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub rules: RulesHandle,
    pub store: Arc<AssessmentStore>,
    pub settings: Arc<EngineSettings>,
    pub crawler: Arc<dyn CrawlDispatcher>,
}

impl AppState {
    pub fn new(rules: RulesHandle, settings: EngineSettings) -> Self {
        Self {
            rules,
            store: Arc::new(AssessmentStore::new()),
            settings: Arc::new(settings),
            crawler: Arc::new(LoggingDispatcher),
        }
    }

    pub fn with_crawler(mut self, crawler: Arc<dyn CrawlDispatcher>) -> Self {
        self.crawler = crawler;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/jobs", get(list_jobs))
        .route("/jobs/search", get(search_jobs))
        .route("/jobs/high-risk", get(high_risk_jobs))
        .route("/jobs/{id}", get(job_by_id))
        .route("/stats/dashboard", get(stats_dashboard))
        .route("/stats/trend", get(stats_trend))
        .route("/stats/overview", get(stats_overview))
        .route("/stats/keywords", get(stats_keywords))
        .route("/reports/daily/{date}", get(daily_report))
        .route("/postings", post(ingest_postings))
        .route("/crawlers/crawl", post(trigger_crawl))
        .route("/admin/rescore", post(admin_rescore))
        .route("/admin/reload-rules", post(admin_reload_rules))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/* ----------------------------
Errors
---------------------------- */

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/* ----------------------------
Wire shapes
---------------------------- */

/// Posting fields plus the nested assessment evidence.
#[derive(Serialize)]
pub struct JobView<'a> {
    #[serde(flatten)]
    pub posting: &'a Posting,
    pub risk_analysis: &'a RiskAssessment,
    pub keyword_matches: &'a [KeywordMatch],
    pub pattern_matches: &'a [PatternMatch],
}

impl<'a> From<&'a AssessedPosting> for JobView<'a> {
    fn from(a: &'a AssessedPosting) -> Self {
        Self {
            posting: &a.posting,
            risk_analysis: &a.scored.assessment,
            keyword_matches: &a.scored.keyword_matches,
            pattern_matches: &a.scored.pattern_matches,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScoringReport {
    pub rules_version: String,
    pub inserted: usize,
    pub updated: usize,
    pub scored: usize,
    pub failures: Vec<ScoringFailure>,
}

/* ----------------------------
Listing
---------------------------- */

#[derive(Debug, Default, Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
    skip: Option<usize>,
    risk_level: Option<String>,
    search: Option<String>,
    source_site: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    page: Option<usize>,
    risk_level: Option<String>,
    search: Option<String>,
    source_site: Option<String>,
}

fn parse_filter(
    search: Option<&str>,
    risk_level: Option<&str>,
    source_site: Option<&str>,
) -> Result<JobFilter, ApiError> {
    JobFilter::from_params(search, risk_level, source_site)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<JobsQuery>,
) -> Result<Response, ApiError> {
    let filter = parse_filter(
        q.search.as_deref(),
        q.risk_level.as_deref(),
        q.source_site.as_deref(),
    )?;
    let limit = q.limit.unwrap_or(DEFAULT_JOBS_LIMIT).min(MAX_JOBS_LIMIT);
    let skip = q.skip.unwrap_or(0);

    let snapshot = state.store.snapshot();
    let filtered = filter.apply(&snapshot);
    let total = filtered.len();
    let rows: Vec<JobView> = listing::window(&filtered, skip, limit)
        .into_iter()
        .map(JobView::from)
        .collect();

    let mut resp = Json(rows).into_response();
    resp.headers_mut()
        .insert(X_TOTAL_COUNT, HeaderValue::from(total));
    Ok(resp)
}

async fn search_jobs(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let mut cursor = ListingCursor::new(state.settings.page_size);
    cursor.set_filter(parse_filter(
        q.search.as_deref(),
        q.risk_level.as_deref(),
        q.source_site.as_deref(),
    )?);
    cursor.set_page(q.page.unwrap_or(1));

    let snapshot = state.store.snapshot();
    let page = cursor.fetch(&snapshot);
    let view = Page {
        items: page.items.iter().map(JobView::from).collect::<Vec<_>>(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
        total_pages: page.total_pages,
    };
    Ok(Json(view).into_response())
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn high_risk_jobs(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_HIGH_RISK_LIMIT).min(MAX_JOBS_LIMIT);
    let ranked = dashboard::rank_high_risk(&state.store.snapshot(), limit);
    let rows: Vec<JobView> = ranked.iter().map(JobView::from).collect();
    Json(rows).into_response()
}

async fn job_by_id(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let item = state
        .store
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("no assessed posting with id {id}")))?;
    Ok(Json(JobView::from(&item)).into_response())
}

/* ----------------------------
Statistics & reports
---------------------------- */

async fn stats_dashboard(State(state): State<AppState>) -> Json<dashboard::DashboardSnapshot> {
    Json(dashboard::snapshot(&state.store.snapshot()))
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    days: Option<usize>,
}

async fn stats_trend(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> Result<Json<Vec<dashboard::TrendPoint>>, ApiError> {
    let days = q.days.unwrap_or(DEFAULT_TREND_DAYS);
    if days == 0 || days > state.settings.trend_max_days {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            state.settings.trend_max_days
        )));
    }
    let today = Utc::now().date_naive();
    Ok(Json(dashboard::trend(&state.store.snapshot(), days, today)))
}

async fn stats_overview(State(state): State<AppState>) -> Json<dashboard::Overview> {
    Json(dashboard::overview(
        &state.store.snapshot(),
        OVERVIEW_TOP_SOURCES,
    ))
}

async fn stats_keywords(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<dashboard::KeywordStat>> {
    let limit = q.limit.unwrap_or(DEFAULT_KEYWORDS_LIMIT);
    Json(dashboard::top_keywords(&state.store.snapshot(), limit))
}

async fn daily_report(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<dashboard::DailyReport>, ApiError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date `{date}`, expected YYYY-MM-DD")))?;
    Ok(Json(dashboard::daily_report(&state.store.snapshot(), date)))
}

/* ----------------------------
Ingestion, scoring, admin
---------------------------- */

/// Score `postings` off the async runtime and store the results.
async fn score_and_record(
    state: &AppState,
    postings: Vec<Posting>,
) -> Result<(usize, Vec<ScoringFailure>, String), ApiError> {
    let rules = state.rules.current();
    let max_body_chars = state.settings.max_body_chars;
    let store = Arc::clone(&state.store);
    let version = rules.version.clone();

    tokio::task::spawn_blocking(move || {
        let outcome = score_batch(&postings, &rules, max_body_chars, Utc::now());
        let failures: Vec<ScoringFailure> = outcome.failures.iter().map(ScoringFailure::from).collect();
        let scored = store.record_all(outcome.scored);
        (scored, failures, version)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("scoring task failed: {e}")))
}

async fn ingest_postings(
    State(state): State<AppState>,
    Json(batch): Json<Vec<NewPosting>>,
) -> Result<Json<ScoringReport>, ApiError> {
    let now = Utc::now();
    let (mut inserted, mut updated) = (0, 0);
    let mut postings = Vec::with_capacity(batch.len());
    for new in batch {
        let (posting, kind) = state.store.upsert(new, now);
        match kind {
            UpsertKind::Inserted => inserted += 1,
            UpsertKind::Updated => updated += 1,
        }
        postings.push(posting);
    }

    let (scored, failures, rules_version) = score_and_record(&state, postings).await?;
    info!(target: "api", inserted, updated, scored, failed = failures.len(), "postings ingested");
    Ok(Json(ScoringReport {
        rules_version,
        inserted,
        updated,
        scored,
        failures,
    }))
}

async fn admin_rescore(State(state): State<AppState>) -> Result<Json<ScoringReport>, ApiError> {
    let postings = state.store.all_postings();
    let (scored, failures, rules_version) = score_and_record(&state, postings).await?;
    info!(target: "api", %rules_version, scored, failed = failures.len(), "rescore finished");
    Ok(Json(ScoringReport {
        rules_version,
        inserted: 0,
        updated: 0,
        scored,
        failures,
    }))
}

async fn admin_reload_rules(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rules = state
        .rules
        .reload_from(&state.settings.rules_path)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;
    Ok(Json(json!({
        "version": rules.version,
        "keywords": rules.dictionary.len(),
        "patterns": rules.patterns.len(),
    })))
}

async fn trigger_crawl(
    State(state): State<AppState>,
    Json(req): Json<CrawlRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let job = req
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let crawler = Arc::clone(&state.crawler);
    let dispatched = job.clone();
    tokio::spawn(async move {
        if let Err(e) = crawler.dispatch(dispatched).await {
            warn!(target: "crawl", dispatcher = crawler.name(), error = ?e, "crawl dispatch failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "job": job })),
    ))
}
