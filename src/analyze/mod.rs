// src/analyze/mod.rs
//! Scoring pipeline: analysis text → keyword matches → pattern matches → assessment.
//!
//! Each posting is scored independently against a shared, read-only `RuleSet`, so a
//! batch fans out over rayon's pool with no locking.

pub mod dictionary;
pub mod matcher;
pub mod patterns;
pub mod rules;
pub mod scoring;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ScoringError;
use crate::metrics::{POSTINGS_SCORED_TOTAL, SCORING_BATCH_MS, SCORING_FAILURES_TOTAL};
use crate::posting::Posting;

pub use dictionary::{KeywordDictionary, KeywordEntry, KeywordSpec, Tier};
pub use matcher::{match_keywords, KeywordMatch};
pub use patterns::{PatternMatch, PatternSpec, PatternTable};
pub use rules::{start_hot_reload_thread, RuleSet, RulesHandle};
pub use scoring::{
    aggregate, round1, Combination, Narrative, RiskAssessment, RiskLevel, ScoringConfig,
    Thresholds, TierFactors,
};

/// Everything one scoring run produces for one posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPosting {
    /// Posting revision the evidence was computed from.
    pub revision: u64,
    pub keyword_matches: Vec<KeywordMatch>,
    pub pattern_matches: Vec<PatternMatch>,
    pub assessment: RiskAssessment,
}

impl ScoredPosting {
    pub fn posting_id(&self) -> u64 {
        self.assessment.posting_id
    }
}

/// Score a single posting.
pub fn score_posting(
    posting: &Posting,
    rules: &RuleSet,
    max_body_chars: usize,
    assessed_at: DateTime<Utc>,
) -> Result<ScoredPosting, ScoringError> {
    let text = posting.analysis_text(max_body_chars)?;
    let keyword_matches = match_keywords(posting.id, &text, &rules.dictionary);
    let pattern_matches = rules.patterns.detect(posting.id, &keyword_matches);
    let assessment = aggregate(
        posting.id,
        &keyword_matches,
        &pattern_matches,
        &rules.scoring,
        &rules.narrative,
        assessed_at,
    )?;

    debug!(
        target: "scoring",
        posting_id = posting.id,
        keywords = keyword_matches.len(),
        patterns = pattern_matches.len(),
        final_score = assessment.final_score,
        level = %assessment.risk_level,
        "posting scored"
    );

    Ok(ScoredPosting {
        revision: posting.revision,
        keyword_matches,
        pattern_matches,
        assessment,
    })
}

/// Result of a batch run: successes and per-posting failures, both in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub scored: Vec<ScoredPosting>,
    pub failures: Vec<ScoringError>,
}

/// Score many postings in parallel. A failing posting never aborts the batch.
pub fn score_batch(
    postings: &[Posting],
    rules: &RuleSet,
    max_body_chars: usize,
    assessed_at: DateTime<Utc>,
) -> BatchOutcome {
    let started = Instant::now();

    let results: Vec<Result<ScoredPosting, ScoringError>> = postings
        .par_iter()
        .map(|p| score_posting(p, rules, max_body_chars, assessed_at))
        .collect();

    let mut out = BatchOutcome::default();
    for r in results {
        match r {
            Ok(s) => out.scored.push(s),
            Err(e) => {
                warn!(target: "scoring", posting_id = e.posting_id(), stage = %e.stage(), error = %e, "posting skipped");
                metrics::counter!(SCORING_FAILURES_TOTAL, "stage" => e.stage().to_string())
                    .increment(1);
                out.failures.push(e);
            }
        }
    }

    let ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::counter!(POSTINGS_SCORED_TOTAL).increment(out.scored.len() as u64);
    metrics::histogram!(SCORING_BATCH_MS).record(ms);
    info!(
        target: "scoring",
        rules_version = %rules.version,
        scored = out.scored.len(),
        failed = out.failures.len(),
        ms,
        "batch scored"
    );
    out
}
