//! Boundary to the external crawler.
//!
//! The engine does not crawl. `POST /crawlers/crawl` validates the request and hands a
//! `CrawlJob` to a `CrawlDispatcher`; whatever the crawler yields comes back through
//! `POST /postings`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Site identifiers the crawler understands.
pub const SUPPORTED_SITES: &[&str] = &[
    "jobkorea",
    "incruit",
    "alba",
    "albamon",
    "jobplanet",
    "jobposting",
    "worknet",
    "saramin",
    "hibrain",
    "blind",
    "all",
];

pub const DEFAULT_MAX_JOBS: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlRequest {
    pub site: String,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: i64,
}

fn default_max_jobs() -> i64 {
    DEFAULT_MAX_JOBS
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlRequestError {
    #[error("unsupported site `{0}`")]
    UnknownSite(String),
    #[error("max_jobs must be a positive integer (got {got})")]
    InvalidMaxJobs { got: i64 },
}

/// A validated crawl request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlJob {
    pub site: String,
    pub keyword: Option<String>,
    pub max_jobs: u32,
}

impl CrawlRequest {
    pub fn validate(self) -> Result<CrawlJob, CrawlRequestError> {
        let site = self.site.trim().to_ascii_lowercase();
        if !SUPPORTED_SITES.contains(&site.as_str()) {
            return Err(CrawlRequestError::UnknownSite(self.site));
        }
        let max_jobs = u32::try_from(self.max_jobs)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(CrawlRequestError::InvalidMaxJobs { got: self.max_jobs })?;
        Ok(CrawlJob {
            site,
            keyword: self
                .keyword
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            max_jobs,
        })
    }
}

#[async_trait::async_trait]
pub trait CrawlDispatcher: Send + Sync {
    async fn dispatch(&self, job: CrawlJob) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Default dispatcher: records the request. Deployments wire a real crawler instead.
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher;

#[async_trait::async_trait]
impl CrawlDispatcher for LoggingDispatcher {
    async fn dispatch(&self, job: CrawlJob) -> Result<()> {
        info!(
            target: "crawl",
            site = %job.site,
            keyword = job.keyword.as_deref().unwrap_or(""),
            max_jobs = job.max_jobs,
            "crawl requested"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
