//! Post-ranking filtering and pagination.

use crate::error::{Error, Result};
use crate::index::DocId;
use crate::schema::{normalize_file_type, parse_timestamp, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One page of an ordered result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// Slice `items` to `[(page-1)*page_size, page*page_size)`. `total_count`
/// defaults to `items.len()`.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize, total_count: Option<usize>) -> Page<T> {
    let total = total_count.unwrap_or(items.len());
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let items: Vec<T> = items.into_iter().skip(start).take(page_size).collect();
    let total_pages = if page_size > 0 { total.div_ceil(page_size) } else { 1 };
    Page { items, total, page, page_size, total_pages, has_next: page < total_pages, has_previous: page > 1 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub path: String,
    pub score: f32,
    pub highlights: Option<String>,
    pub file_type: String,
    pub size_preview: String,
}

/// Optional post-ranking filters. Empty or absent values do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub file_types: Option<Vec<String>>,
    #[serde(default)]
    pub min_score: Option<f32>,
    /// RFC 3339 lower bound on `indexed_at`, inclusive.
    #[serde(default)]
    pub date_from: Option<String>,
    /// RFC 3339 upper bound on `indexed_at`, inclusive.
    #[serde(default)]
    pub date_to: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.file_types.as_ref().map_or(true, |v| v.is_empty())
            && self.min_score.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    pub fn compile(&self) -> Result<FilterSet> {
        let file_types = self
            .file_types
            .as_ref()
            .filter(|v| !v.is_empty())
            .map(|v| v.iter().map(|t| normalize_file_type(t)).collect::<HashSet<_>>());
        if let Some(min) = self.min_score {
            if !(min >= 0.0) {
                return Err(Error::InvalidRequest(format!("min_score must be >= 0, got {min}")));
            }
        }
        let date = |raw: &Option<String>, name: &str| -> Result<Option<i64>> {
            match raw {
                None => Ok(None),
                Some(s) => parse_timestamp(s).map(Some).ok_or_else(|| Error::InvalidRequest(format!("{name} is not an RFC 3339 timestamp: {s}"))),
            }
        };
        Ok(FilterSet {
            file_types,
            min_score: self.min_score,
            date_from: date(&self.date_from, "date_from")?,
            date_to: date(&self.date_to, "date_to")?,
        })
    }
}

/// Validated filters, ready to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    file_types: Option<HashSet<String>>,
    min_score: Option<f32>,
    date_from: Option<i64>,
    date_to: Option<i64>,
}

impl FilterSet {
    pub fn accepts(&self, hit: &Hit<'_>) -> bool {
        if let Some(types) = &self.file_types {
            if !types.contains(&hit.doc.file_type) {
                return false;
            }
        }
        if self.min_score.map_or(false, |min| hit.score < min) {
            return false;
        }
        if self.date_from.map_or(false, |from| hit.doc.indexed_at < from) {
            return false;
        }
        !self.date_to.map_or(false, |to| hit.doc.indexed_at > to)
    }
}

/// A ranked document with the stored fields needed to filter and display it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit<'r> {
    pub doc_id: DocId,
    pub score: f32,
    pub doc: &'r Document,
}

/// Drop hits rejected by `filters` (keeping rank order) and cut out the
/// requested page.
///
/// `total` is the engine's pre-filter match count and is reported as is, so
/// with active filters `total`/`total_pages` can exceed what the pages
/// actually deliver.
pub fn assemble<'r>(hits: Vec<Hit<'r>>, total: usize, filters: &FilterSet, page: usize, page_size: usize) -> Page<Hit<'r>> {
    let filtered: Vec<Hit<'r>> = hits.into_iter().filter(|h| filters.accepts(h)).collect();
    paginate(filtered, page, page_size, Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_envelope() {
        let p = paginate((0..15).collect::<Vec<_>>(), 2, 10, None);
        assert_eq!(p.items, (10..15).collect::<Vec<_>>());
        assert_eq!((p.total, p.total_pages, p.has_next, p.has_previous), (15, 2, false, true));

        let first = paginate((0..15).collect::<Vec<_>>(), 1, 10, None);
        assert!(first.has_next && !first.has_previous);
    }

    #[test]
    fn total_pages_is_ceiling() {
        for total in 0..40usize {
            for size in 1..12usize {
                let p = paginate(vec![(); total], 1, size, None);
                assert_eq!(p.total_pages, (total + size - 1) / size);
            }
        }
        assert_eq!(paginate(Vec::<u8>::new(), 1, 0, Some(7)).total_pages, 1);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let p = paginate(vec![1, 2, 3], 5, 2, None);
        assert!(p.items.is_empty());
        assert!(!p.has_next && p.has_previous);
    }

    fn doc(file_type: &str, indexed_at: i64) -> Document {
        let mut d = Document::new(format!("/d.{file_type}"), "d", "body", file_type);
        d.indexed_at = indexed_at;
        d
    }

    #[test]
    fn filters_apply_after_ranking_without_reordering() {
        let docs = [doc("txt", 100), doc("md", 100), doc("txt", 100), doc("txt", 300)];
        let hits: Vec<Hit> = docs.iter().enumerate().map(|(i, d)| Hit { doc_id: i as DocId, score: 4.0 - i as f32, doc: d }).collect();
        let filters = SearchFilters {
            file_types: Some(vec![".TXT".into()]),
            min_score: Some(1.5),
            date_to: Some("1970-01-01T00:03:20Z".into()),
            ..Default::default()
        }
        .compile()
        .unwrap();
        let page = assemble(hits, 4, &filters, 1, 10);
        assert_eq!(page.items.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 2]);
        // pre-filter total is kept
        assert_eq!(page.total, 4);
    }

    #[test]
    fn invalid_filters_are_rejected() {
        let bad_date = SearchFilters { date_from: Some("last week".into()), ..Default::default() };
        assert!(matches!(bad_date.compile(), Err(Error::InvalidRequest(_))));
        let bad_score = SearchFilters { min_score: Some(-1.0), ..Default::default() };
        assert!(matches!(bad_score.compile(), Err(Error::InvalidRequest(_))));
        assert!(SearchFilters { file_types: Some(vec![]), ..Default::default() }.is_empty());
    }
}
