//! In-memory posting and assessment store.
//!
//! Postings are keyed by a store-assigned id and deduplicated by fingerprint. Each
//! posting has at most one current `ScoredPosting`, held behind `Arc` and replaced
//! wholesale by the next scoring run. Every re-ingest bumps the posting's revision, and
//! a result is only accepted for the revision it was computed from. Readers take a
//! snapshot (cloned postings plus `Arc` clones of the results) and reduce over it
//! without holding the lock.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::analyze::{RiskAssessment, ScoredPosting};
use crate::posting::{NewPosting, Posting};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// A posting with its current assessment.
#[derive(Debug, Clone)]
pub struct AssessedPosting {
    pub posting: Posting,
    pub scored: Arc<ScoredPosting>,
}

impl AssessedPosting {
    pub fn assessment(&self) -> &RiskAssessment {
        &self.scored.assessment
    }
}

#[derive(Debug, Default)]
struct Inner {
    last_id: u64,
    postings: BTreeMap<u64, Posting>,
    by_fingerprint: HashMap<String, u64>,
    results: HashMap<u64, Arc<ScoredPosting>>,
}

#[derive(Debug, Default)]
pub struct AssessmentStore {
    inner: RwLock<Inner>,
}

impl AssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new posting or update the one sharing its fingerprint (keeping its id and
    /// bumping its revision). An update drops the stale assessment; the caller re-scores.
    pub fn upsert(&self, new: NewPosting, now: DateTime<Utc>) -> (Posting, UpsertKind) {
        let fingerprint = new.fingerprint();
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let (id, kind) = match g.by_fingerprint.get(&fingerprint) {
            Some(&id) => (id, UpsertKind::Updated),
            None => {
                g.last_id += 1;
                let id = g.last_id;
                g.by_fingerprint.insert(fingerprint.clone(), id);
                (id, UpsertKind::Inserted)
            }
        };

        let mut posting = new.into_posting(id, now);
        if let Some(prev) = g.postings.get(&id) {
            posting.revision = prev.revision + 1;
        }
        g.postings.insert(id, posting.clone());
        if kind == UpsertKind::Updated {
            g.results.remove(&id);
        }
        debug!(
            target: "store",
            posting_id = id,
            revision = posting.revision,
            %fingerprint,
            ?kind,
            "posting upserted"
        );
        (posting, kind)
    }

    /// Store a scoring result, replacing any previous one. Returns false if the posting
    /// is unknown or was re-ingested after the result was computed.
    pub fn record(&self, scored: ScoredPosting) -> bool {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Self::record_locked(&mut g, scored)
    }

    /// Store a whole batch under one lock. Returns how many results were accepted.
    pub fn record_all(&self, batch: Vec<ScoredPosting>) -> usize {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut stored = 0;
        for scored in batch {
            if Self::record_locked(&mut g, scored) {
                stored += 1;
            }
        }
        stored
    }

    fn record_locked(g: &mut Inner, scored: ScoredPosting) -> bool {
        let id = scored.posting_id();
        let Some(current) = g.postings.get(&id).map(|p| p.revision) else {
            return false;
        };
        if current != scored.revision {
            debug!(
                target: "store",
                posting_id = id,
                current,
                stale = scored.revision,
                "stale result discarded"
            );
            return false;
        }
        g.results.insert(id, Arc::new(scored));
        true
    }

    pub fn posting(&self, id: u64) -> Option<Posting> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.postings.get(&id).cloned()
    }

    pub fn get(&self, id: u64) -> Option<AssessedPosting> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let posting = g.postings.get(&id)?.clone();
        let scored = g.results.get(&id)?.clone();
        Some(AssessedPosting { posting, scored })
    }

    /// Every stored posting in id order, assessed or not.
    pub fn all_postings(&self) -> Vec<Posting> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.postings.values().cloned().collect()
    }

    /// Consistent copy of all assessed postings, newest crawl first, then id ascending.
    pub fn snapshot(&self) -> Vec<AssessedPosting> {
        let mut out: Vec<AssessedPosting> = {
            let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            g.postings
                .iter()
                .filter_map(|(id, p)| {
                    g.results.get(id).map(|s| AssessedPosting {
                        posting: p.clone(),
                        scored: Arc::clone(s),
                    })
                })
                .collect()
        };
        out.sort_by(|a, b| {
            b.posting
                .crawled_at
                .cmp(&a.posting.crawled_at)
                .then(a.posting.id.cmp(&b.posting.id))
        });
        out
    }

    pub fn len(&self) -> usize {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn assessed_len(&self) -> usize {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{score_posting, RuleSet};
    use chrono::{Duration, TimeZone};

    const RULES: &str = r#"
[[keywords]]
keyword = "반도체"
tier = 1
category = "technology"
weight = 1.0

[[keywords]]
keyword = "유출"
tier = 3
category = "risk"
weight = 5.0
"#;

    fn new_posting(url: &str, body: &str, crawled_at: DateTime<Utc>) -> NewPosting {
        NewPosting {
            title: "엔지니어".into(),
            company: "회사".into(),
            location: None,
            salary: None,
            url: Some(url.into()),
            posted_date: None,
            source_site: "saramin".into(),
            search_keyword: None,
            body: Some(body.into()),
            crawled_at: Some(crawled_at),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn recrawl_updates_in_place_and_drops_stale_result() {
        let rules = RuleSet::from_toml_str(RULES).unwrap();
        let store = AssessmentStore::new();

        let (p, kind) = store.upsert(new_posting("u1", "반도체", t0()), t0());
        assert_eq!(kind, UpsertKind::Inserted);
        assert!(store.record(score_posting(&p, &rules, 2000, t0()).unwrap()));
        assert_eq!(store.assessed_len(), 1);

        let (p2, kind) = store.upsert(new_posting("u1", "다른 본문", t0()), t0());
        assert_eq!(kind, UpsertKind::Updated);
        assert_eq!(p2.id, p.id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.assessed_len(), 0);
        assert!(store.get(p.id).is_none());
        assert_eq!(store.posting(p.id).unwrap().body.as_deref(), Some("다른 본문"));
    }

    #[test]
    fn record_replaces_wholesale_and_ignores_unknown_ids() {
        let rules = RuleSet::from_toml_str(RULES).unwrap();
        let store = AssessmentStore::new();
        let (p, _) = store.upsert(new_posting("u1", "반도체", t0()), t0());

        let first = score_posting(&p, &rules, 2000, t0()).unwrap();
        let later = t0() + Duration::hours(1);
        let second = score_posting(&p, &rules, 2000, later).unwrap();
        store.record(first);
        store.record(second.clone());
        assert_eq!(*store.get(p.id).unwrap().scored, second);

        let mut stray = second;
        stray.assessment.posting_id = 999;
        assert!(!store.record(stray));
    }

    #[test]
    fn result_for_an_older_revision_is_rejected() {
        let rules = RuleSet::from_toml_str(RULES).unwrap();
        let store = AssessmentStore::new();

        let (p, _) = store.upsert(new_posting("u1", "기술 유출 유출", t0()), t0());
        assert_eq!(p.revision, 0);
        // a rescore reads the postings, then scores off the lock
        let read_for_rescore = store.all_postings();

        let (p2, kind) = store.upsert(new_posting("u1", "평범한 공고", t0()), t0());
        assert_eq!(kind, UpsertKind::Updated);
        assert_eq!(p2.revision, 1);
        assert!(store.record(score_posting(&p2, &rules, 2000, t0()).unwrap()));

        let stale: Vec<ScoredPosting> = read_for_rescore
            .iter()
            .map(|p| score_posting(p, &rules, 2000, t0()).unwrap())
            .collect();
        assert_eq!(stale[0].assessment.final_score, 20.0);
        assert_eq!(store.record_all(stale), 0);

        let current = store.get(p.id).unwrap();
        assert_eq!(current.posting.body.as_deref(), Some("평범한 공고"));
        assert_eq!(current.scored.revision, 1);
        assert!(current.scored.keyword_matches.is_empty());
        assert_eq!(current.assessment().final_score, 0.0);
    }

    #[test]
    fn snapshot_orders_newest_first_then_id() {
        let rules = RuleSet::from_toml_str(RULES).unwrap();
        let store = AssessmentStore::new();
        let later = t0() + Duration::days(1);
        for (url, at) in [("a", t0()), ("b", later), ("c", t0())] {
            let (p, _) = store.upsert(new_posting(url, "반도체", at), at);
            store.record(score_posting(&p, &rules, 2000, at).unwrap());
        }
        // unscored posting is not part of the snapshot
        store.upsert(new_posting("d", "반도체", later), later);

        let ids: Vec<u64> = store.snapshot().iter().map(|a| a.posting.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(store.all_postings().len(), 4);
    }
}
