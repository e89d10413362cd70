//! Combination patterns ("combos") over a posting's keyword matches.
//!
//! A pattern lists requirements; each one is satisfied by a keyword match of the named
//! category and/or keyword, at or above an optional minimum tier. By default the check is
//! set coverage. A pattern with `ordered = { window = N }` instead needs a chain of hits,
//! one per requirement in declaration order, each starting after the previous one and at
//! most `N` characters away from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dictionary::{KeywordDictionary, Tier};
use super::matcher::KeywordMatch;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub score: f64,
    pub requires: Vec<RequirementSpec>,
    #[serde(default)]
    pub ordered: Option<OrderingSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequirementSpec {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub min_tier: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderingSpec {
    pub window: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Requirement {
    category: Option<String>,
    keyword_id: Option<u32>,
    min_tier: Tier,
}

impl Requirement {
    fn accepts(&self, m: &KeywordMatch) -> bool {
        self.keyword_id.is_none_or(|id| id == m.keyword_id)
            && self.category.as_deref().is_none_or(|c| c == m.category)
            && m.tier >= self.min_tier
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub name: String,
    pub description: String,
    pub score: f64,
    requires: Vec<Requirement>,
    window: Option<usize>,
}

impl Pattern {
    pub fn is_ordered(&self) -> bool {
        self.window.is_some()
    }
}

/// A satisfied pattern. At most one per (posting, pattern name).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub posting_id: u64,
    pub pattern_name: String,
    pub description: String,
    /// Contributing keywords, in keyword id order.
    pub keywords: Vec<String>,
    pub score: f64,
}

/// Validated pattern table, kept sorted by name.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    patterns: Vec<Pattern>,
}

impl PatternTable {
    pub fn from_specs(specs: &[PatternSpec], dict: &KeywordDictionary) -> Result<Self, ConfigError> {
        let mut by_name: BTreeMap<String, Pattern> = BTreeMap::new();

        for spec in specs {
            let name = spec.name.trim().to_string();
            if by_name.contains_key(&name) {
                return Err(ConfigError::DuplicatePattern(name));
            }
            if spec.requires.is_empty() {
                return Err(ConfigError::EmptyPattern(name));
            }
            if !spec.score.is_finite() || spec.score < 0.0 {
                return Err(ConfigError::InvalidPatternScore {
                    pattern: name,
                    score: spec.score,
                });
            }
            let window = match &spec.ordered {
                Some(o) if o.window == 0 => return Err(ConfigError::InvalidWindow(name)),
                Some(o) => Some(o.window),
                None => None,
            };

            let mut requires = Vec::with_capacity(spec.requires.len());
            for (index, r) in spec.requires.iter().enumerate() {
                let category = r
                    .category
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                let keyword = r.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty());
                if category.is_none() && keyword.is_none() {
                    return Err(ConfigError::EmptyRequirement {
                        pattern: name,
                        index,
                    });
                }
                let keyword_id = match keyword {
                    Some(k) => Some(dict.lookup(k).map(|e| e.id).ok_or_else(|| {
                        ConfigError::UnknownPatternKeyword {
                            pattern: name.clone(),
                            keyword: k.to_string(),
                        }
                    })?),
                    None => None,
                };
                let min_tier = match r.min_tier {
                    Some(t) => Tier::new(t).ok_or_else(|| ConfigError::InvalidPatternTier {
                        pattern: name.clone(),
                        tier: t,
                    })?,
                    None => Tier::ONE,
                };
                requires.push(Requirement {
                    category,
                    keyword_id,
                    min_tier,
                });
            }

            by_name.insert(
                name.clone(),
                Pattern {
                    name,
                    description: spec.description.trim().to_string(),
                    score: spec.score,
                    requires,
                    window,
                },
            );
        }

        Ok(Self {
            patterns: by_name.into_values().collect(),
        })
    }

    /// Patterns in name order.
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Evaluate every pattern against one posting's matches. Stateless; output is in
    /// pattern name order.
    pub fn detect(&self, posting_id: u64, matches: &[KeywordMatch]) -> Vec<PatternMatch> {
        self.patterns
            .iter()
            .filter_map(|p| {
                let ids = match p.window {
                    None => covering_keywords(&p.requires, matches),
                    Some(window) => ordered_chain(&p.requires, matches, window),
                }?;
                let mut keywords: Vec<(u32, &str)> = ids
                    .into_iter()
                    .filter_map(|id| {
                        matches
                            .iter()
                            .find(|m| m.keyword_id == id)
                            .map(|m| (id, m.keyword.as_str()))
                    })
                    .collect();
                keywords.sort_by_key(|(id, _)| *id);
                keywords.dedup_by_key(|(id, _)| *id);
                Some(PatternMatch {
                    posting_id,
                    pattern_name: p.name.clone(),
                    description: p.description.clone(),
                    keywords: keywords.into_iter().map(|(_, k)| k.to_string()).collect(),
                    score: p.score,
                })
            })
            .collect()
    }
}

/// Set coverage: every requirement needs at least one accepting match.
/// Returns the ids of all accepting matches.
fn covering_keywords(requires: &[Requirement], matches: &[KeywordMatch]) -> Option<Vec<u32>> {
    let mut ids = Vec::new();
    for r in requires {
        let before = ids.len();
        ids.extend(matches.iter().filter(|m| r.accepts(m)).map(|m| m.keyword_id));
        if ids.len() == before {
            return None;
        }
    }
    Some(ids)
}

#[derive(Debug, Clone, Copy)]
struct Hop {
    pos: usize,
    keyword_id: u32,
    prev: Option<usize>,
}

/// Ordered proximity: walk requirements in order, keeping every position reachable by a
/// valid chain so far. Returns the keyword ids of the chain ending earliest.
fn ordered_chain(
    requires: &[Requirement],
    matches: &[KeywordMatch],
    window: usize,
) -> Option<Vec<u32>> {
    let candidates = |r: &Requirement| -> Vec<(usize, u32)> {
        let mut c: Vec<(usize, u32)> = matches
            .iter()
            .filter(|m| r.accepts(m))
            .flat_map(|m| m.positions.iter().map(move |&p| (p, m.keyword_id)))
            .collect();
        c.sort_unstable();
        c
    };

    let mut arena: Vec<Hop> = Vec::new();
    let mut frontier: Vec<usize> = Vec::new();

    for (step, r) in requires.iter().enumerate() {
        let mut next = Vec::new();
        for (pos, keyword_id) in candidates(r) {
            let prev = if step == 0 {
                None
            } else {
                // frontier is in ascending position order; take the closest predecessor
                let found = frontier
                    .iter()
                    .rev()
                    .copied()
                    .find(|&h| arena[h].pos < pos && pos - arena[h].pos <= window);
                match found {
                    Some(h) => Some(h),
                    None => continue,
                }
            };
            arena.push(Hop {
                pos,
                keyword_id,
                prev,
            });
            next.push(arena.len() - 1);
        }
        if next.is_empty() {
            return None;
        }
        frontier = next;
    }

    let mut ids = Vec::with_capacity(requires.len());
    let mut cursor = frontier.first().copied();
    while let Some(h) = cursor {
        ids.push(arena[h].keyword_id);
        cursor = arena[h].prev;
    }
    Some(ids)
}
