//! Keyword matcher: case-insensitive substring scan of the analysis text.
//!
//! Every occurrence is recorded, overlapping ones included (`"aa"` in `"aaa"` hits at
//! 0 and 1). Different keywords never suppress each other, so a keyword and a longer
//! keyword containing it both match.

use serde::Serialize;

use super::dictionary::{fold, KeywordDictionary, Tier};

/// Evidence that one dictionary keyword occurred in one posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordMatch {
    pub posting_id: u64,
    pub keyword_id: u32,
    pub keyword: String,
    pub tier: Tier,
    pub category: String,
    pub weight: f64,
    /// Character offsets into the analysis text, ascending.
    pub positions: Vec<usize>,
}

impl KeywordMatch {
    pub fn occurrences(&self) -> usize {
        self.positions.len()
    }
}

/// Scan `text` against every dictionary entry.
/// Output is ordered by ascending keyword id; keywords with no hit are omitted.
pub fn match_keywords(posting_id: u64, text: &str, dict: &KeywordDictionary) -> Vec<KeywordMatch> {
    let hay = fold(text);
    dict.entries()
        .iter()
        .filter_map(|entry| {
            let positions = find_all(&hay, &entry.folded);
            if positions.is_empty() {
                return None;
            }
            Some(KeywordMatch {
                posting_id,
                keyword_id: entry.id,
                keyword: entry.keyword.clone(),
                tier: entry.tier,
                category: entry.category.clone(),
                weight: entry.weight,
                positions,
            })
        })
        .collect()
}

fn find_all(hay: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > hay.len() {
        return Vec::new();
    }
    hay.windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}
