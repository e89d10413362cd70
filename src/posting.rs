//! Posting records as handed over by the crawler, plus ingest-time normalization.
//!
//! A posting is immutable once ingested. Its identity for dedup purposes is a
//! fingerprint over (source site, URL), falling back to (source site, title, company)
//! when the crawler could not capture a URL.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

/// One crawled job advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: u64,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    pub source_site: String,
    #[serde(default)]
    pub search_keyword: Option<String>,
    /// Raw text body. `None` when the crawler failed to capture it.
    #[serde(default, skip_serializing)]
    pub body: Option<String>,
    pub crawled_at: DateTime<Utc>,
    /// Bumped by the store on every re-ingest of the same fingerprint.
    #[serde(default)]
    pub revision: u64,
}

/// Ingest payload: a posting before the store has assigned it an id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPosting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    pub source_site: String,
    #[serde(default)]
    pub search_keyword: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub crawled_at: Option<DateTime<Utc>>,
}

impl NewPosting {
    /// Stable dedup key. Re-crawls of the same fingerprint update rather than duplicate.
    pub fn fingerprint(&self) -> String {
        let site = self.source_site.trim().to_lowercase();
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => short_hash(&["url", &site, url]),
            None => short_hash(&[
                "title",
                &site,
                &normalize_text(&self.title).to_lowercase(),
                &normalize_text(&self.company).to_lowercase(),
            ]),
        }
    }

    /// Normalize text fields and attach the store-assigned id.
    pub fn into_posting(self, id: u64, now: DateTime<Utc>) -> Posting {
        let opt = |v: Option<String>| {
            v.map(|s| normalize_text(&s))
                .filter(|s| !s.is_empty())
        };
        Posting {
            id,
            title: normalize_text(&self.title),
            company: normalize_text(&self.company),
            location: opt(self.location),
            salary: opt(self.salary),
            url: self.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            posted_date: self.posted_date,
            source_site: self.source_site.trim().to_string(),
            search_keyword: self.search_keyword,
            // An empty body is still a body; only an absent one is a scoring error.
            body: self.body.map(|b| normalize_text(&b)),
            crawled_at: self.crawled_at.unwrap_or(now),
            revision: 0,
        }
    }
}

impl Posting {
    /// Text scanned by the matcher: title, company, location, salary and the body
    /// (truncated to `max_body_chars` characters), joined by single spaces.
    /// Keyword positions are character offsets into this string.
    pub fn analysis_text(&self, max_body_chars: usize) -> Result<String, ScoringError> {
        let body = self
            .body
            .as_deref()
            .ok_or(ScoringError::MissingBody {
                posting_id: self.id,
            })?;
        if body.contains('\0') {
            return Err(ScoringError::MalformedText {
                posting_id: self.id,
                reason: "body contains NUL characters".into(),
            });
        }
        let body: String = body.chars().take(max_body_chars).collect();

        let parts = [
            Some(self.title.as_str()),
            Some(self.company.as_str()),
            self.location.as_deref(),
            self.salary.as_deref(),
            Some(body.as_str()),
        ];
        Ok(parts
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    let stripped = re_tags.replace_all(&decoded, " ");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// First 16 bytes of SHA-256 over the NUL-joined parts, hex encoded.
fn short_hash(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(p.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
