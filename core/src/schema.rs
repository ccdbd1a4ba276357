use serde::{Deserialize, Serialize};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Stored fields of every document, in schema order. `path` is the unique key.
pub const SCHEMA_FIELDS: [&str; 5] = ["title", "path", "content", "file_type", "indexed_at"];

/// Fields that are analyzed and carry postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Title,
    Content,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Title, Field::Content];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Content => "content",
        }
    }
}

/// A document as handed to the writer: already-extracted plain text plus
/// display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub title: String,
    pub content: String,
    /// Lower-case extension without the dot; not analyzed.
    pub file_type: String,
    /// Unix timestamp (seconds) of the last (re)index.
    pub indexed_at: i64,
}

impl Document {
    pub fn new(path: impl Into<String>, title: impl Into<String>, content: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            content: content.into(),
            file_type: normalize_file_type(&file_type.into()),
            indexed_at: now_timestamp(),
        }
    }

    /// Build a document for a file on disk: the title is the file name and
    /// the file type its extension. `indexed_at` is the batch timestamp.
    pub fn from_file(path: &Path, content: String, indexed_at: i64) -> Self {
        let title = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        Self { indexed_at, ..Self::new(path.to_string_lossy(), title, content, file_type_of(path)) }
    }

    pub fn text(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Content => &self.content,
        }
    }
}

/// Lower-case extension of `path` without the leading dot, or "" if none.
pub fn file_type_of(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

/// Accepts both "txt" and ".TXT".
pub fn normalize_file_type(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

pub fn now_timestamp() -> i64 { OffsetDateTime::now_utc().unix_timestamp() }

pub fn parse_timestamp(s: &str) -> Option<i64> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).ok().map(|t| t.unix_timestamp())
}
