// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - POST /postings (ingest + scoring report, dedup, missing body)
// - GET  /jobs, /jobs/search, /jobs/high-risk, /jobs/{id}
// - GET  /stats/dashboard, /stats/trend, /stats/overview, /stats/keywords
// - GET  /reports/daily/{date}
// - POST /crawlers/crawl, /admin/rescore, /admin/reload-rules

use std::io::Write as _;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use job_risk_engine::analyze::{RuleSet, RulesHandle};
use job_risk_engine::{router, AppState, EngineSettings};

const BODY_LIMIT: usize = 1 * 1024 * 1024; // 1MB, safe for tests

const RULES: &str = r#"
version = "api-test"

[scoring]
thresholds = { medium = 50.0, high = 100.0 }

[narrative.category_labels]
technology = "첨단기술 분야"
language = "언어 요구"
risk = "위험 키워드"

[[keywords]]
keyword = "반도체"
tier = 1
category = "technology"
weight = 10.0

[[keywords]]
keyword = "중국어"
tier = 2
category = "language"
weight = 10.0

[[keywords]]
keyword = "유출"
tier = 3
category = "risk"
weight = 20.0

[[patterns]]
name = "tech_language"
score = 0.5
requires = [{ category = "technology" }, { category = "language" }]
"#;

fn settings(rules_path: PathBuf) -> EngineSettings {
    EngineSettings {
        rules_path,
        page_size: NonZeroUsize::new(2).unwrap(),
        ..EngineSettings::default()
    }
}

/// Same Router the binary uses, with in-memory rules and an empty store.
fn test_router() -> Router {
    let rules = RuleSet::from_toml_str(RULES).expect("test rules");
    let state = AppState::new(
        RulesHandle::new(rules),
        settings(PathBuf::from("/nonexistent/rules.toml")),
    );
    router(state)
}

/// Three postings: one of each level.
///   high:   20 + 15 + 40 = 75, x1.5 (tech_language) = 112.5
///   low:    10 + 15 = 25, x1.5 = 37.5
///   medium: 2 x 20 x 2.0 = 80
fn sample_batch() -> Json {
    json!([
        {
            "title": "반도체 공정 엔지니어",
            "company": "Acme Semi",
            "source_site": "saramin",
            "url": "https://example.test/jobs/1",
            "body": "반도체 중국어 필수, 유출 주의"
        },
        {
            "title": "반도체 연구원",
            "company": "Beta Labs",
            "source_site": "jobkorea",
            "url": "https://example.test/jobs/2",
            "body": "중국어 가능자 우대"
        },
        {
            "title": "보안 담당자",
            "company": "Gamma",
            "source_site": "saramin",
            "url": "https://example.test/jobs/3",
            "body": "유출 방지, 유출 대응"
        }
    ])
}

async fn send(app: &Router, method: &str, uri: &str, payload: Option<Json>) -> (StatusCode, Json) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match payload {
        Some(p) => {
            builder = builder.header("content-type", "application/json");
            Body::from(p.to_string())
        }
        None => Body::empty(),
    };
    let req = builder.body(body).expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Json::Null)
    };
    (status, json)
}

async fn seeded() -> Router {
    let app = test_router();
    let (status, report) = send(&app, "POST", "/postings", Some(sample_batch())).await;
    assert_eq!(status, StatusCode::OK, "ingest failed: {report}");
    app
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn ingest_reports_counts_and_rules_version() {
    let app = test_router();
    let (status, report) = send(&app, "POST", "/postings", Some(sample_batch())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rules_version"], "api-test");
    assert_eq!(report["inserted"], 3);
    assert_eq!(report["updated"], 0);
    assert_eq!(report["scored"], 3);
    assert_eq!(report["failures"].as_array().unwrap().len(), 0);

    // same urls again: updates, not duplicates
    let (_, again) = send(&app, "POST", "/postings", Some(sample_batch())).await;
    assert_eq!(again["inserted"], 0);
    assert_eq!(again["updated"], 3);

    let (_, dash) = send(&app, "GET", "/stats/dashboard", None).await;
    assert_eq!(dash["total"], 3);
}

#[tokio::test]
async fn missing_body_is_reported_without_blocking_the_batch() {
    let app = test_router();
    let batch = json!([
        { "title": "반도체", "company": "A", "source_site": "saramin", "body": "중국어" },
        { "title": "no body", "company": "B", "source_site": "saramin" }
    ]);
    let (status, report) = send(&app, "POST", "/postings", Some(batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["scored"], 1);
    let failures = report["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["stage"], "text");

    // unscored postings stay out of listings
    let (_, dash) = send(&app, "GET", "/stats/dashboard", None).await;
    assert_eq!(dash["total"], 1);
}

#[tokio::test]
async fn dashboard_counts_each_level() {
    let app = seeded().await;
    let (status, dash) = send(&app, "GET", "/stats/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dash, json!({ "total": 3, "high": 1, "medium": 1, "low": 1 }));
}

#[tokio::test]
async fn job_detail_carries_assessment_and_evidence() {
    let app = seeded().await;
    let (_, jobs) = send(&app, "GET", "/jobs?search=acme", None).await;
    let id = jobs[0]["id"].as_u64().expect("id");

    let (status, job) = send(&app, "GET", &format!("/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["company"], "Acme Semi");
    assert!(job.get("body").is_none(), "body is not part of the wire shape");

    let risk = &job["risk_analysis"];
    assert_eq!(risk["risk_level"], "고위험");
    assert_eq!(risk["base_score"], 75.0);
    assert_eq!(risk["combo_multiplier"], 1.5);
    assert_eq!(risk["final_score"], 112.5);
    assert!(risk["analysis_summary"]
        .as_str()
        .unwrap()
        .starts_with("고위험 (점수: 112.5)"));

    let kws: Vec<&str> = job["keyword_matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["keyword"].as_str().unwrap())
        .collect();
    assert_eq!(kws, vec!["반도체", "중국어", "유출"]);
    assert_eq!(job["pattern_matches"][0]["pattern_name"], "tech_language");

    let (status, err) = send(&app, "GET", "/jobs/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(err["error"].is_string());
}

#[tokio::test]
async fn jobs_listing_filters_and_sets_total_header() {
    let app = seeded().await;

    let req = Request::builder()
        .uri("/jobs?source_site=saramin&limit=1")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-total-count"], "2");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let rows: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let (_, high) = send(&app, "GET", "/jobs?risk_level=high", None).await;
    assert_eq!(high.as_array().unwrap().len(), 1);
    assert_eq!(high[0]["company"], "Acme Semi");

    let (status, _) = send(&app, "GET", "/jobs?risk_level=severe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_pages_use_configured_page_size() {
    let app = seeded().await;

    let (_, first) = send(&app, "GET", "/jobs/search", None).await;
    assert_eq!(first["total"], 3);
    assert_eq!(first["page_size"], 2);
    assert_eq!(first["total_pages"], 2);
    assert_eq!(first["items"].as_array().unwrap().len(), 2);

    let (_, second) = send(&app, "GET", "/jobs/search?page=2", None).await;
    assert_eq!(second["page"], 2);
    assert_eq!(second["items"].as_array().unwrap().len(), 1);

    let (_, filtered) = send(&app, "GET", "/jobs/search?risk_level=all&source_site=jobkorea", None).await;
    assert_eq!(filtered["total"], 1);
    assert_eq!(filtered["total_pages"], 1);
}

#[tokio::test]
async fn high_risk_ranking_only_lists_high_level() {
    let app = seeded().await;
    let (_, ranked) = send(&app, "GET", "/jobs/high-risk?limit=5", None).await;
    let scores: Vec<f64> = ranked
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["risk_analysis"]["final_score"].as_f64().unwrap())
        .collect();
    assert_eq!(scores, vec![112.5]);
}

#[tokio::test]
async fn trend_returns_one_point_per_day_and_rejects_bad_ranges() {
    let app = seeded().await;

    let (status, points) = send(&app, "GET", "/stats/trend?days=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 5);
    let total: u64 = points.iter().map(|p| p["total"].as_u64().unwrap()).sum();
    assert_eq!(total, 3);

    let (_, default) = send(&app, "GET", "/stats/trend", None).await;
    assert_eq!(default.as_array().unwrap().len(), 7);

    let (status, _) = send(&app, "GET", "/stats/trend?days=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "GET", "/stats/trend?days=91", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "GET", "/stats/trend?days=100000000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overview_and_keyword_stats() {
    let app = seeded().await;

    let (_, ov) = send(&app, "GET", "/stats/overview", None).await;
    assert_eq!(ov["total"], 3);
    assert_eq!(ov["average_score"], 76.7);
    assert_eq!(ov["top_sources"][0]["source_site"], "saramin");
    assert_eq!(ov["top_sources"][0]["count"], 2);

    let (_, kws) = send(&app, "GET", "/stats/keywords?limit=2", None).await;
    let kws = kws.as_array().unwrap();
    assert_eq!(kws.len(), 2);
    for k in kws {
        assert_eq!(k["postings"], 2);
    }
}

#[tokio::test]
async fn daily_report_for_today_and_bad_dates() {
    let app = seeded().await;
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let (status, report) = send(&app, "GET", &format!("/reports/daily/{today}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], 3);
    assert_eq!(report["high_risk"].as_array().unwrap().len(), 1);
    assert!(report["recommended_action"].is_string());

    let (status, _) = send(&app, "GET", "/reports/daily/2025-13-40", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn crawl_requests_are_validated_then_accepted() {
    let app = test_router();

    let (status, body) = send(
        &app,
        "POST",
        "/crawlers/crawl",
        Some(json!({ "site": "Saramin", "keyword": "반도체", "max_jobs": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["job"]["site"], "saramin");
    assert_eq!(body["job"]["max_jobs"], 5);

    let (status, _) = send(&app, "POST", "/crawlers/crawl", Some(json!({ "site": "monster" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        "POST",
        "/crawlers/crawl",
        Some(json!({ "site": "saramin", "max_jobs": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reload_rules_swaps_on_success_and_keeps_rules_on_failure() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(RULES.as_bytes()).unwrap();
    file.flush().unwrap();

    let rules = RuleSet::from_toml_str(RULES).unwrap();
    let state = AppState::new(RulesHandle::new(rules), settings(file.path().to_path_buf()));
    let app = router(state);
    let (_, _) = send(&app, "POST", "/postings", Some(sample_batch())).await;

    // stricter thresholds; a rescore moves the medium posting to high
    let stricter = RULES.replace("medium = 50.0, high = 100.0", "medium = 30.0, high = 60.0")
        .replace("api-test", "api-test-2");
    std::fs::write(file.path(), &stricter).unwrap();
    let (status, body) = send(&app, "POST", "/admin/reload-rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "version": "api-test-2", "keywords": 3, "patterns": 1 }));

    let (_, report) = send(&app, "POST", "/admin/rescore", None).await;
    assert_eq!(report["rules_version"], "api-test-2");
    assert_eq!(report["scored"], 3);
    let (_, dash) = send(&app, "GET", "/stats/dashboard", None).await;
    assert_eq!(dash, json!({ "total": 3, "high": 2, "medium": 1, "low": 0 }));

    std::fs::write(file.path(), "keywords = 3").unwrap();
    let (status, err) = send(&app, "POST", "/admin/reload-rules", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(err["error"].is_string());

    let (_, report) = send(&app, "POST", "/admin/rescore", None).await;
    assert_eq!(report["rules_version"], "api-test-2");
}
