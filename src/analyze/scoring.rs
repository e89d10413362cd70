//! Score aggregation: keyword evidence and satisfied patterns become one `RiskAssessment`.
//!
//! base       = Σ weight × tier_factor(tier) × occurrences   (ascending keyword id)
//! multiplier = 1 + Σ pattern score                          (additive, default)
//!            | Π (1 + pattern score)                        (multiplicative)
//! final      = base × multiplier
//!
//! The level is a step function of `final` over closed-open intervals:
//! `[0, medium)` low, `[medium, high)` medium, `[high, ∞)` high.
//! Because `medium > 0`, a posting without keyword matches is always low.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::dictionary::Tier;
use super::matcher::KeywordMatch;
use super::patterns::PatternMatch;
use crate::error::{ConfigError, ScoringError, ScoringStage};

/// Ordinal risk classification. Wire values are the Korean labels the dashboard keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "저위험")]
    Low,
    #[serde(rename = "중위험")]
    Medium,
    #[serde(rename = "고위험")]
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::High => "고위험",
            RiskLevel::Medium => "중위험",
            RiskLevel::Low => "저위험",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown risk level `{0}`")]
pub struct ParseRiskLevelError(pub String);

impl FromStr for RiskLevel {
    type Err = ParseRiskLevelError;

    /// Accepts the wire labels and their English names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "고위험" | "high" => Ok(RiskLevel::High),
            "중위험" | "medium" => Ok(RiskLevel::Medium),
            "저위험" | "low" => Ok(RiskLevel::Low),
            other => Err(ParseRiskLevelError(other.to_string())),
        }
    }
}

/// Escalation factor per tier. Must be non-decreasing in tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierFactors {
    pub tier1: f64,
    pub tier2: f64,
    pub tier3: f64,
}

impl Default for TierFactors {
    fn default() -> Self {
        Self {
            tier1: 1.0,
            tier2: 1.5,
            tier3: 2.0,
        }
    }
}

impl TierFactors {
    pub fn factor(&self, tier: Tier) -> f64 {
        match tier.get() {
            1 => self.tier1,
            2 => self.tier2,
            _ => self.tier3,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.tier1, self.tier2, self.tier3];
        let ok = all.iter().all(|f| f.is_finite() && *f >= 0.0)
            && self.tier1 <= self.tier2
            && self.tier2 <= self.tier3;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidTierFactors {
                tier1: self.tier1,
                tier2: self.tier2,
                tier3: self.tier3,
            })
        }
    }
}

/// Cut points on the final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            medium: 50.0,
            high: 100.0,
        }
    }
}

impl Thresholds {
    pub fn new(medium: f64, high: f64) -> Result<Self, ConfigError> {
        let t = Self { medium, high };
        t.validate()?;
        Ok(t)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.medium.is_finite()
            && self.high.is_finite()
            && self.medium > 0.0
            && self.medium < self.high;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::NonMonotonicThresholds {
                medium: self.medium,
                high: self.high,
            })
        }
    }

    pub fn classify(&self, score: f64) -> RiskLevel {
        if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// How satisfied pattern scores combine into the multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combination {
    #[default]
    Additive,
    Multiplicative,
}

impl Combination {
    /// Both laws give 1.0 for no patterns and never go below it (scores are >= 0).
    pub fn multiplier<I: IntoIterator<Item = f64>>(self, scores: I) -> f64 {
        match self {
            Combination::Additive => scores.into_iter().fold(1.0, |acc, s| acc + s),
            Combination::Multiplicative => scores.into_iter().fold(1.0, |acc, s| acc * (1.0 + s)),
        }
    }
}

/// The tuning surface: tier factors, combination law, thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub tier_factors: TierFactors,
    #[serde(default)]
    pub combination: Combination,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tier_factors.validate()?;
        self.thresholds.validate()
    }
}

/// Human-readable wording attached to assessments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Narrative {
    /// category -> display label; unknown categories fall back to the raw name.
    #[serde(default)]
    pub category_labels: BTreeMap<String, String>,
    #[serde(default = "default_pattern_label")]
    pub pattern_label: String,
    #[serde(default)]
    pub recommendations: Recommendations,
}

fn default_pattern_label() -> String {
    "복합 패턴 탐지".to_string()
}

impl Default for Narrative {
    fn default() -> Self {
        Self {
            category_labels: BTreeMap::new(),
            pattern_label: default_pattern_label(),
            recommendations: Recommendations::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Recommendations {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl Default for Recommendations {
    fn default() -> Self {
        let v = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            high: v(&[
                "즉시 정밀 조사 필요",
                "산업보안법 위반 여부 확인",
                "기업 등기부등본 및 실소유주 확인",
                "외국인투자신고 내역 확인",
                "해당 기업 공고 전수 조사",
                "관련 당국에 신고 검토",
            ]),
            medium: v(&[
                "모니터링 강화 필요",
                "기업 배경 조사",
                "유사 공고 패턴 분석",
                "정기적인 추적 관찰",
            ]),
            low: v(&["일반 모니터링", "정기 리뷰 대상"]),
        }
    }
}

impl Recommendations {
    pub fn for_level(&self, level: RiskLevel) -> &[String] {
        match level {
            RiskLevel::High => &self.high,
            RiskLevel::Medium => &self.medium,
            RiskLevel::Low => &self.low,
        }
    }
}

/// The single current assessment of one posting. Replaced wholesale on re-score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub posting_id: u64,
    pub base_score: f64,
    pub combo_multiplier: f64,
    /// Full precision; see [`RiskAssessment::display_score`] for the rendered value.
    pub final_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub analysis_summary: String,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn display_score(&self) -> f64 {
        round1(self.final_score)
    }
}

/// One-decimal rounding for reporting only.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Combine one posting's evidence into its assessment.
/// `assessed_at` is supplied by the caller so the result depends on inputs only.
pub fn aggregate(
    posting_id: u64,
    matches: &[KeywordMatch],
    patterns: &[PatternMatch],
    cfg: &ScoringConfig,
    narrative: &Narrative,
    assessed_at: DateTime<Utc>,
) -> Result<RiskAssessment, ScoringError> {
    let mut ordered: Vec<&KeywordMatch> = matches.iter().collect();
    ordered.sort_by_key(|m| m.keyword_id);
    let base_score = ordered.iter().fold(0.0_f64, |acc, m| {
        acc + m.weight * cfg.tier_factors.factor(m.tier) * m.occurrences() as f64
    });
    if !base_score.is_finite() {
        return Err(ScoringError::NonFiniteScore {
            posting_id,
            stage: ScoringStage::KeywordMatch,
        });
    }

    let mut by_name: Vec<&PatternMatch> = patterns.iter().collect();
    by_name.sort_by(|a, b| a.pattern_name.cmp(&b.pattern_name));
    let combo_multiplier = cfg
        .combination
        .multiplier(by_name.iter().map(|p| p.score));
    if !combo_multiplier.is_finite() {
        return Err(ScoringError::NonFiniteScore {
            posting_id,
            stage: ScoringStage::PatternDetect,
        });
    }

    let final_score = base_score * combo_multiplier;
    if !final_score.is_finite() {
        return Err(ScoringError::NonFiniteScore {
            posting_id,
            stage: ScoringStage::Aggregate,
        });
    }
    let risk_level = cfg.thresholds.classify(final_score);

    let risk_factors = risk_factors(&ordered, &by_name, narrative);
    let analysis_summary = format!(
        "{} (점수: {:.1}) | 주요 요인: {}개 | 키워드 {}개 | 복합 패턴 {}개",
        risk_level,
        round1(final_score),
        risk_factors.len(),
        ordered.len(),
        by_name.len(),
    );

    Ok(RiskAssessment {
        posting_id,
        base_score,
        combo_multiplier,
        final_score,
        risk_level,
        risk_factors,
        recommendations: narrative.recommendations.for_level(risk_level).to_vec(),
        analysis_summary,
        assessed_at,
    })
}

/// One line per category (in order of the category's lowest keyword id), plus one
/// line naming the satisfied patterns.
fn risk_factors(
    ordered: &[&KeywordMatch],
    patterns: &[&PatternMatch],
    narrative: &Narrative,
) -> Vec<String> {
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for m in ordered {
        match groups.iter_mut().find(|(c, _)| *c == m.category) {
            Some((_, kws)) => kws.push(&m.keyword),
            None => groups.push((&m.category, vec![&m.keyword])),
        }
    }

    let mut out: Vec<String> = groups
        .into_iter()
        .map(|(category, kws)| {
            let label = narrative
                .category_labels
                .get(category)
                .map(String::as_str)
                .unwrap_or(category);
            format!("{}: {}", label, kws.join(", "))
        })
        .collect();

    if !patterns.is_empty() {
        let names: Vec<&str> = patterns.iter().map(|p| p.pattern_name.as_str()).collect();
        out.push(format!("{}: {}", narrative.pattern_label, names.join(", ")));
    }
    out
}
