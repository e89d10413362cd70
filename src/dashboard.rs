//! Dashboard aggregation: pure reductions over a snapshot of assessed postings.
//!
//! Nothing here touches the store; callers take `AssessmentStore::snapshot()` first and
//! reduce over the copy, so aggregation can run alongside scoring.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::analyze::{round1, RiskLevel, Tier};
use crate::store::AssessedPosting;

/// Counts by level. `total == high + medium + low` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl DashboardSnapshot {
    fn add(&mut self, level: RiskLevel) {
        self.total += 1;
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
        }
    }
}

pub fn snapshot(items: &[AssessedPosting]) -> DashboardSnapshot {
    let mut s = DashboardSnapshot::default();
    for a in items {
        s.add(a.assessment().risk_level);
    }
    s
}

/// One UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Longest trend window served, about ten years.
pub const MAX_TREND_DAYS: usize = 3660;

/// Exactly `days` points ending at `today`, ascending, zero-filled. Assessments are
/// bucketed by the UTC date of their own `assessed_at`. Empty when `days` is 0, above
/// [`MAX_TREND_DAYS`], or reaches before the first representable date.
pub fn trend(items: &[AssessedPosting], days: usize, today: NaiveDate) -> Vec<TrendPoint> {
    if days == 0 || days > MAX_TREND_DAYS {
        return Vec::new();
    }
    let Some(start) = today.checked_sub_days(Days::new(days as u64 - 1)) else {
        return Vec::new();
    };

    let mut buckets = vec![DashboardSnapshot::default(); days];
    for a in items {
        let day = a.assessment().assessed_at.date_naive();
        if day < start || day > today {
            continue;
        }
        let idx = (day - start).num_days() as usize;
        buckets[idx].add(a.assessment().risk_level);
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(i, s)| TrendPoint {
            date: start + Days::new(i as u64),
            total: s.total,
            high: s.high,
            medium: s.medium,
            low: s.low,
        })
        .collect()
}

/// High-risk postings: final score desc, then most recent assessment, then id asc.
pub fn rank_high_risk(items: &[AssessedPosting], limit: usize) -> Vec<AssessedPosting> {
    let mut high: Vec<&AssessedPosting> = items
        .iter()
        .filter(|a| a.assessment().risk_level == RiskLevel::High)
        .collect();
    high.sort_by(|a, b| rank_order(a, b));
    high.into_iter().take(limit).cloned().collect()
}

fn rank_order(a: &AssessedPosting, b: &AssessedPosting) -> Ordering {
    let (x, y) = (a.assessment(), b.assessment());
    y.final_score
        .total_cmp(&x.final_score)
        .then(y.assessed_at.cmp(&x.assessed_at))
        .then(a.posting.id.cmp(&b.posting.id))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordStat {
    pub keyword: String,
    pub tier: Tier,
    pub category: String,
    /// Postings in which the keyword matched.
    pub postings: usize,
    /// Sum of occurrences across those postings.
    pub occurrences: usize,
}

/// Most frequently matched keywords: posting count desc, occurrences desc, keyword asc.
pub fn top_keywords(items: &[AssessedPosting], limit: usize) -> Vec<KeywordStat> {
    let mut by_keyword: HashMap<&str, KeywordStat> = HashMap::new();
    for a in items {
        for m in &a.scored.keyword_matches {
            let stat = by_keyword.entry(&m.keyword).or_insert_with(|| KeywordStat {
                keyword: m.keyword.clone(),
                tier: m.tier,
                category: m.category.clone(),
                postings: 0,
                occurrences: 0,
            });
            stat.postings += 1;
            stat.occurrences += m.occurrences();
        }
    }
    let mut stats: Vec<KeywordStat> = by_keyword.into_values().collect();
    stats.sort_by(|a, b| {
        b.postings
            .cmp(&a.postings)
            .then(b.occurrences.cmp(&a.occurrences))
            .then(a.keyword.cmp(&b.keyword))
    });
    stats.truncate(limit);
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub source_site: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
    /// Mean final score, rounded for display.
    pub average_score: f64,
    pub top_sources: Vec<SourceCount>,
}

pub fn overview(items: &[AssessedPosting], top_sources: usize) -> Overview {
    let snapshot = snapshot(items);

    let mut scores: Vec<(u64, f64)> = items
        .iter()
        .map(|a| (a.posting.id, a.assessment().final_score))
        .collect();
    scores.sort_by_key(|(id, _)| *id);
    let average_score = if scores.is_empty() {
        0.0
    } else {
        round1(scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64)
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in items {
        *counts.entry(a.posting.source_site.as_str()).or_default() += 1;
    }
    let mut sources: Vec<SourceCount> = counts
        .into_iter()
        .map(|(s, count)| SourceCount {
            source_site: s.to_string(),
            count,
        })
        .collect();
    sources.sort_by(|a, b| b.count.cmp(&a.count).then(a.source_site.cmp(&b.source_site)));
    sources.truncate(top_sources);

    Overview {
        snapshot,
        average_score,
        top_sources: sources,
    }
}

pub const ACTION_ESCALATE: &str = "산업보안법 모니터링 및 등기부 실소유주 확인 요청";
pub const ACTION_ROUTINE: &str = "정기 모니터링";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighRiskEntry {
    pub posting_id: u64,
    pub title: String,
    pub company: String,
    pub source_site: String,
    pub final_score: f64,
    pub risk_factors: Vec<String>,
}

/// Report data for one UTC day; rendering is left to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
    pub top_keywords: Vec<KeywordStat>,
    pub recommended_action: String,
    pub high_risk: Vec<HighRiskEntry>,
}

pub fn daily_report(items: &[AssessedPosting], date: NaiveDate) -> DailyReport {
    let day: Vec<AssessedPosting> = items
        .iter()
        .filter(|a| a.assessment().assessed_at.date_naive() == date)
        .cloned()
        .collect();

    let snapshot = snapshot(&day);
    let recommended_action = if snapshot.high > 0 {
        ACTION_ESCALATE
    } else {
        ACTION_ROUTINE
    };
    let high_risk = rank_high_risk(&day, 5)
        .into_iter()
        .map(|a| HighRiskEntry {
            posting_id: a.posting.id,
            title: a.posting.title.clone(),
            company: a.posting.company.clone(),
            source_site: a.posting.source_site.clone(),
            final_score: a.assessment().display_score(),
            risk_factors: a.assessment().risk_factors.clone(),
        })
        .collect();

    DailyReport {
        date,
        snapshot,
        top_keywords: top_keywords(&day, 10),
        recommended_action: recommended_action.to_string(),
        high_risk,
    }
}
