//! The operations exposed to callers: index a directory, search, stats.

use crate::analyzer::Analyzer;
use crate::config::{SearchConfig, DEFAULT_PAGE_SIZE};
use crate::error::{Error, Result};
use crate::extract::ExtractorRegistry;
use crate::highlight::{truncate_text, Highlighter};
use crate::ingest::{self, IndexingReport};
use crate::query::QueryParser;
use crate::results::{assemble, Hit, Page, SearchFilters, SearchResult};
use crate::search::Searcher;
use crate::store::IndexStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const SIZE_PREVIEW_CHARS: usize = 100;

fn default_page() -> usize { 1 }
fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), page: default_page(), page_size: default_page_size(), filters: None }
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn validate(&self, config: &SearchConfig) -> Result<()> {
        let len = self.query.trim().chars().count();
        if len == 0 {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }
        if len > config.max_query_len {
            return Err(Error::InvalidRequest(format!("query longer than {} characters", config.max_query_len)));
        }
        if self.page < 1 {
            return Err(Error::InvalidRequest("page must be >= 1".into()));
        }
        if self.page_size < 1 || self.page_size > config.max_page_size {
            return Err(Error::InvalidRequest(format!("page_size must be between 1 and {}", config.max_page_size)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Page<SearchResult>,
    pub search_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u32,
    pub index_size_mb: f64,
    pub last_updated: Option<String>,
    pub supported_formats: Vec<String>,
}

fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

/// Owns the one index store of the process, opened lazily, and the
/// collaborators every operation needs.
pub struct SearchService {
    config: SearchConfig,
    extractors: ExtractorRegistry,
    highlighter: Highlighter,
    store: RwLock<Option<Arc<IndexStore>>>,
}

impl SearchService {
    pub fn new(config: SearchConfig) -> Self {
        let highlighter = config.highlighter();
        Self { config, extractors: ExtractorRegistry::default(), highlighter, store: RwLock::new(None) }
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn config(&self) -> &SearchConfig { &self.config }

    pub fn extractors(&self) -> &ExtractorRegistry { &self.extractors }

    /// The store, creating an empty index if none exists yet.
    pub fn open_or_create(&self) -> Result<Arc<IndexStore>> {
        self.load_store(|dir| IndexStore::open_or_create(dir, self.config.language))
    }

    /// The store, failing with `IndexNotFound` if no index was created.
    pub fn open_existing(&self) -> Result<Arc<IndexStore>> { self.load_store(|dir| IndexStore::open(dir)) }

    fn load_store(&self, open: impl FnOnce(&Path) -> Result<IndexStore>) -> Result<Arc<IndexStore>> {
        if let Some(store) = self.store.read().as_ref() {
            return Ok(store.clone());
        }
        let mut slot = self.store.write();
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = Arc::new(open(&self.config.index_dir)?);
        *slot = Some(store.clone());
        Ok(store)
    }

    pub fn index_directory(&self, root: &Path) -> Result<IndexingReport> {
        let store = self.open_or_create()?;
        ingest::index_directory(&store, &self.extractors, root, self.config.resource_limits())
    }

    /// Index the configured data directory, creating it if needed.
    pub fn index_data_directory(&self) -> Result<IndexingReport> {
        fs::create_dir_all(&self.config.data_dir)?;
        self.index_directory(&self.config.data_dir)
    }

    /// Rank, filter and paginate. An index with no matching documents gives
    /// an empty page; a missing index is `IndexNotFound`.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        request.validate(&self.config)?;
        let filters = request.filters.clone().unwrap_or_default().compile()?;
        let store = self.open_existing()?;
        let reader = store.read_snapshot();

        let query = QueryParser::new(store.analyzer(), self.config.field_boosts()).parse(&request.query);
        let limit = request.page.saturating_mul(request.page_size).saturating_add(self.config.overfetch);
        let ranked = Searcher::with_params(&reader, self.config.bm25_params()).search(&query, limit);
        let hits: Vec<Hit<'_>> = ranked
            .hits
            .iter()
            .filter_map(|s| reader.document(s.doc_id).map(|d| Hit { doc_id: s.doc_id, score: s.score, doc: &d.doc }))
            .collect();
        let page = assemble(hits, ranked.total, &filters, request.page, request.page_size);

        let terms = query.positive_terms();
        let results = page.map(|hit| self.to_result(store.analyzer(), &hit, &terms));
        let search_time_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
        debug!(query = %request.query, total = results.total, returned = results.items.len(), search_time_ms, "search");
        Ok(SearchResponse { query: request.query.clone(), results, search_time_ms })
    }

    fn to_result(&self, analyzer: &Analyzer, hit: &Hit<'_>, terms: &HashSet<String>) -> SearchResult {
        let doc = hit.doc;
        SearchResult {
            title: if doc.title.is_empty() { "Untitled".into() } else { doc.title.clone() },
            path: doc.path.clone(),
            score: hit.score,
            highlights: Some(self.highlighter.highlight(analyzer, doc, terms)),
            file_type: if doc.file_type.is_empty() { "unknown".into() } else { doc.file_type.clone() },
            size_preview: truncate_text(&doc.content, SIZE_PREVIEW_CHARS),
        }
    }

    /// Stats of the index, or zero documents when none was created yet.
    pub fn stats(&self) -> Result<IndexStats> {
        let supported_formats = self.extractors.supported_formats();
        let store = match self.open_existing() {
            Ok(store) => store,
            Err(Error::IndexNotFound(_)) => {
                return Ok(IndexStats { total_documents: 0, index_size_mb: 0.0, last_updated: None, supported_formats });
            }
            Err(e) => return Err(e),
        };
        let stats = store.stats()?;
        Ok(IndexStats {
            total_documents: stats.document_count,
            index_size_mb: round2(stats.size_on_disk as f64 / (1024.0 * 1024.0)),
            last_updated: Some(stats.last_updated),
            supported_formats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation() {
        let cfg = SearchConfig::default();
        assert!(SearchRequest::new("rust").validate(&cfg).is_ok());
        assert!(SearchRequest::new("   ").validate(&cfg).is_err());
        assert!(SearchRequest::new("x".repeat(501)).validate(&cfg).is_err());
        assert!(SearchRequest::new("rust").page(0, 10).validate(&cfg).is_err());
        assert!(SearchRequest::new("rust").page(1, 51).validate(&cfg).is_err());
        assert!(SearchRequest::new("rust").page(1, 0).validate(&cfg).is_err());
    }

    #[test]
    fn request_json_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query": "rust"}"#).unwrap();
        assert_eq!(req, SearchRequest::new("rust"));
        assert_eq!((req.page, req.page_size), (1, 20));
    }
}
