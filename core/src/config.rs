use crate::analyzer::Language;
use crate::highlight::{Highlighter, DEFAULT_MAX_CHARS, DEFAULT_POST_TAG, DEFAULT_PRE_TAG, DEFAULT_SURROUND};
use crate::query::{CONTENT_BOOST, TITLE_BOOST};
use crate::schema::Field;
use crate::search::{Bm25Params, BM25_B, BM25_K1};
use crate::writer::{ResourceLimits, DEFAULT_LOCK_TIMEOUT, DEFAULT_MEMORY_LIMIT_MB};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;
pub const MAX_QUERY_LEN: usize = 500;
/// Extra candidates fetched beyond the requested page to absorb filtering.
pub const OVERFETCH: usize = 50;

/// Settings shared by the indexer and the server. Missing keys take their
/// defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub index_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Only used when a new index is created.
    pub language: Language,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub max_query_len: usize,
    pub highlight_max_chars: usize,
    pub highlight_surround: usize,
    /// Markers placed around matched words in snippets.
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
    pub overfetch: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub title_boost: f32,
    pub content_boost: f32,
    pub writer_memory_mb: usize,
    pub writer_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./docseek_index"),
            data_dir: PathBuf::from("./data"),
            language: Language::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_query_len: MAX_QUERY_LEN,
            highlight_max_chars: DEFAULT_MAX_CHARS,
            highlight_surround: DEFAULT_SURROUND,
            highlight_pre_tag: DEFAULT_PRE_TAG.into(),
            highlight_post_tag: DEFAULT_POST_TAG.into(),
            overfetch: OVERFETCH,
            bm25_k1: BM25_K1,
            bm25_b: BM25_B,
            title_boost: TITLE_BOOST,
            content_boost: CONTENT_BOOST,
            writer_memory_mb: DEFAULT_MEMORY_LIMIT_MB,
            writer_timeout_secs: DEFAULT_LOCK_TIMEOUT.as_secs(),
        }
    }
}

impl SearchConfig {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            memory_limit_bytes: self.writer_memory_mb.saturating_mul(1024 * 1024),
            lock_timeout: Duration::from_secs(self.writer_timeout_secs),
        }
    }

    pub fn field_boosts(&self) -> Vec<(Field, f32)> {
        vec![(Field::Title, self.title_boost), (Field::Content, self.content_boost)]
    }

    pub fn bm25_params(&self) -> Bm25Params { Bm25Params { k1: self.bm25_k1, b: self.bm25_b } }

    pub fn highlighter(&self) -> Highlighter {
        Highlighter::new(self.highlight_max_chars, self.highlight_surround)
            .with_tags(self.highlight_pre_tag.as_str(), self.highlight_post_tag.as_str())
    }
}
