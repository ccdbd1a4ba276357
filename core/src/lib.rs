//! Full-text indexing and retrieval for a directory of documents.
//!
//! An [`IndexStore`] owns one on-disk index. Documents go in through an
//! [`IndexWriter`] batch and become visible atomically on commit; queries
//! run against an immutable [`IndexReader`] snapshot and are ranked with
//! BM25F. [`SearchService`] ties the pieces together for the binaries.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod index;
pub mod ingest;
mod lock;
pub mod persist;
pub mod query;
pub mod results;
pub mod schema;
pub mod search;
pub mod service;
pub mod store;
pub mod writer;

pub use analyzer::{Analyzer, Language};
pub use config::SearchConfig;
pub use error::{Error, Result};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use highlight::Highlighter;
pub use index::{DocId, InvertedIndex, Posting};
pub use ingest::IndexingReport;
pub use query::{Query, QueryParser};
pub use results::{Page, SearchFilters, SearchResult};
pub use schema::{Document, Field};
pub use search::Searcher;
pub use service::{IndexStats, SearchRequest, SearchResponse, SearchService};
pub use store::{IndexReader, IndexStore, StoreStats};
pub use writer::{CommitReport, IndexWriter, ResourceLimits, UpsertKind};
