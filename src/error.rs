//! Domain errors for rule loading and per-posting scoring.
//!
//! `ConfigError` is fatal at load time: a rule file that fails validation is never
//! partially applied. `ScoringError` is per posting: a batch keeps going and reports
//! the failures alongside the successful assessments.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid rule configuration (dictionary, pattern table, or scoring knobs).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule file: {0}")]
    Parse(String),
    #[error("unsupported rule file format `{0}` (expected toml or json)")]
    UnsupportedFormat(String),

    #[error("keyword entry #{index} is empty")]
    EmptyKeyword { index: usize },
    #[error("keyword `{keyword}` is declared more than once")]
    DuplicateKeyword { keyword: String },
    #[error("keyword `{keyword}` has tier {tier}, expected 1, 2 or 3")]
    InvalidTier { keyword: String, tier: i64 },
    #[error("keyword `{keyword}` has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { keyword: String, weight: f64 },

    #[error("pattern `{0}` is declared more than once")]
    DuplicatePattern(String),
    #[error("pattern `{0}` has no requirements")]
    EmptyPattern(String),
    #[error("pattern `{pattern}` requirement #{index} names neither a category nor a keyword")]
    EmptyRequirement { pattern: String, index: usize },
    #[error("pattern `{pattern}` requires unknown keyword `{keyword}`")]
    UnknownPatternKeyword { pattern: String, keyword: String },
    #[error("pattern `{pattern}` requires tier {tier}, expected 1, 2 or 3")]
    InvalidPatternTier { pattern: String, tier: i64 },
    #[error("pattern `{pattern}` has invalid score {score} (must be finite and >= 0)")]
    InvalidPatternScore { pattern: String, score: f64 },
    #[error("pattern `{0}` declares an ordering window of 0")]
    InvalidWindow(String),

    #[error("risk thresholds must satisfy 0 < medium < high (got medium={medium}, high={high})")]
    NonMonotonicThresholds { medium: f64, high: f64 },
    #[error("tier factors must be finite, >= 0 and non-decreasing (got {tier1}, {tier2}, {tier3})")]
    InvalidTierFactors { tier1: f64, tier2: f64, tier3: f64 },
}

/// Pipeline stage at which a posting failed to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStage {
    Text,
    KeywordMatch,
    PatternDetect,
    Aggregate,
}

impl std::fmt::Display for ScoringStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoringStage::Text => "text",
            ScoringStage::KeywordMatch => "keyword_match",
            ScoringStage::PatternDetect => "pattern_detect",
            ScoringStage::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

/// A single posting could not be scored. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("posting {posting_id}: text body is missing")]
    MissingBody { posting_id: u64 },
    #[error("posting {posting_id}: malformed text ({reason})")]
    MalformedText { posting_id: u64, reason: String },
    #[error("posting {posting_id}: score is not finite at {stage}")]
    NonFiniteScore { posting_id: u64, stage: ScoringStage },
}

impl ScoringError {
    pub fn posting_id(&self) -> u64 {
        match self {
            ScoringError::MissingBody { posting_id }
            | ScoringError::MalformedText { posting_id, .. }
            | ScoringError::NonFiniteScore { posting_id, .. } => *posting_id,
        }
    }

    pub fn stage(&self) -> ScoringStage {
        match self {
            ScoringError::MissingBody { .. } | ScoringError::MalformedText { .. } => {
                ScoringStage::Text
            }
            ScoringError::NonFiniteScore { stage, .. } => *stage,
        }
    }
}

/// Serializable failure record returned to callers of batch scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringFailure {
    pub posting_id: u64,
    pub stage: ScoringStage,
    pub message: String,
}

impl From<&ScoringError> for ScoringFailure {
    fn from(e: &ScoringError) -> Self {
        Self {
            posting_id: e.posting_id(),
            stage: e.stage(),
            message: e.to_string(),
        }
    }
}
