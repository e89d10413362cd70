//! Filter/paginate over assessed postings.
//!
//! Predicates AND together; an absent (or `"all"`) predicate is a no-op. Pages are
//! 1-indexed. Asking for a page past the end yields an empty page with the same total.

use serde::Serialize;
use std::num::NonZeroUsize;

use crate::analyze::scoring::ParseRiskLevelError;
use crate::analyze::RiskLevel;
use crate::store::AssessedPosting;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Lowercased search needle.
    search: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub source_site: Option<String>,
}

fn active(v: Option<&str>) -> Option<&str> {
    v.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
}

impl JobFilter {
    /// Build from raw query values. Empty strings and `"all"` mean "no filter".
    pub fn from_params(
        search: Option<&str>,
        risk_level: Option<&str>,
        source_site: Option<&str>,
    ) -> Result<Self, ParseRiskLevelError> {
        let risk_level = active(risk_level)
            .map(str::parse::<RiskLevel>)
            .transpose()?;
        Ok(Self {
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            risk_level,
            source_site: active(source_site).map(str::to_string),
        })
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn matches(&self, item: &AssessedPosting) -> bool {
        if let Some(level) = self.risk_level {
            if item.assessment().risk_level != level {
                return false;
            }
        }
        if let Some(site) = &self.source_site {
            if item.posting.source_site != *site {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let hit = item.posting.title.to_lowercase().contains(needle)
                || item.posting.company.to_lowercase().contains(needle);
            if !hit {
                return false;
            }
        }
        true
    }

    /// Filtered subset, input order preserved.
    pub fn apply<'a>(&self, items: &'a [AssessedPosting]) -> Vec<&'a AssessedPosting> {
        items.iter().filter(|a| self.matches(a)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: NonZeroUsize) -> Page<T> {
    let size = page_size.get();
    let total = items.len();
    let total_pages = total.div_ceil(size);
    let slice: &[T] = match page.checked_sub(1).and_then(|p| p.checked_mul(size)) {
        Some(start) if start < total => &items[start..(start + size).min(total)],
        _ => &[],
    };
    Page {
        items: slice.to_vec(),
        total,
        page,
        page_size: size,
        total_pages,
    }
}

/// Offset/limit slice used by `GET /jobs`.
pub fn window<T: Clone>(items: &[T], skip: usize, limit: usize) -> Vec<T> {
    items.iter().skip(skip).take(limit).cloned().collect()
}

/// Filter plus current page. Changing the filter always resets to page 1.
#[derive(Debug, Clone)]
pub struct ListingCursor {
    filter: JobFilter,
    page: usize,
    page_size: NonZeroUsize,
}

impl ListingCursor {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self {
            filter: JobFilter::default(),
            page: 1,
            page_size,
        }
    }

    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_filter(&mut self, filter: JobFilter) {
        self.filter = filter;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    pub fn fetch(&self, items: &[AssessedPosting]) -> Page<AssessedPosting> {
        let filtered: Vec<AssessedPosting> =
            self.filter.apply(items).into_iter().cloned().collect();
        paginate(&filtered, self.page, self.page_size)
    }
}
