//! Tiered keyword dictionary.
//!
//! Entries are declared in the rule file as `{ keyword, tier, category, weight }`.
//! Each entry gets a stable id (its declaration index); score summation walks matches
//! in ascending id order so results are bit-reproducible.
//!
//! Tiers: 1 = technology field, 2 = suspicious context (language, overseas, company,
//! collaboration), 3 = direct risk wording. The tier only feeds the escalation factor;
//! the category is what patterns combine over.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::ConfigError;

/// Keyword tier, always within 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const ONE: Tier = Tier(1);
    pub const TWO: Tier = Tier(2);
    pub const THREE: Tier = Tier(3);

    pub fn new(raw: i64) -> Option<Tier> {
        match raw {
            1..=3 => Some(Tier(raw as u8)),
            _ => None,
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<Tier> for u8 {
    fn from(t: Tier) -> u8 {
        t.0
    }
}

/// Raw dictionary row as written in the rule file.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSpec {
    pub keyword: String,
    pub tier: i64,
    pub category: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordEntry {
    pub id: u32,
    pub keyword: String,
    pub tier: Tier,
    pub category: String,
    pub weight: f64,
    pub(crate) folded: Vec<char>,
}

/// Validated, immutable dictionary.
#[derive(Debug, Clone, Default)]
pub struct KeywordDictionary {
    entries: Vec<KeywordEntry>,
    by_folded: HashMap<String, u32>,
}

impl KeywordDictionary {
    /// Validate every row; the first invalid row rejects the whole dictionary.
    pub fn from_specs(specs: &[KeywordSpec]) -> Result<Self, ConfigError> {
        let mut entries = Vec::with_capacity(specs.len());
        let mut by_folded = HashMap::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            let keyword = spec.keyword.trim().to_string();
            if keyword.is_empty() {
                return Err(ConfigError::EmptyKeyword { index });
            }
            let tier = Tier::new(spec.tier).ok_or_else(|| ConfigError::InvalidTier {
                keyword: keyword.clone(),
                tier: spec.tier,
            })?;
            if !spec.weight.is_finite() || spec.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    keyword,
                    weight: spec.weight,
                });
            }

            let folded = fold(&keyword);
            let key: String = folded.iter().collect();
            let id = index as u32;
            if by_folded.insert(key, id).is_some() {
                return Err(ConfigError::DuplicateKeyword { keyword });
            }

            entries.push(KeywordEntry {
                id,
                keyword,
                tier,
                category: spec.category.trim().to_string(),
                weight: spec.weight,
                folded,
            });
        }

        Ok(Self { entries, by_folded })
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive lookup by keyword text.
    pub fn lookup(&self, keyword: &str) -> Option<&KeywordEntry> {
        let key: String = fold(keyword.trim()).into_iter().collect();
        self.by_folded
            .get(&key)
            .and_then(|&id| self.entries.get(id as usize))
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.category.as_str()).collect()
    }
}

/// Simple case folding that keeps a 1:1 char mapping, so offsets in folded text
/// line up with offsets in the original.
pub(crate) fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

pub(crate) fn fold(s: &str) -> Vec<char> {
    s.chars().map(fold_char).collect()
}
