//! Error types for the docseek engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for docseek operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Search was attempted before any index was created.
    #[error("index not found at {0} - run indexing first")]
    IndexNotFound(PathBuf),

    /// The index directory holds artifacts that cannot be opened.
    #[error("index at {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    /// Another batch held the writer lock for longer than the timeout.
    #[error("writer busy: lock not acquired within {0:?}")]
    WriterBusy(Duration),

    /// The batch could not be made durable; the previous state is still live.
    #[error("commit failed: {0}")]
    Commit(String),

    /// A single document was rejected by the writer.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A search request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Text could not be extracted from a file.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self { Error::Serialization(e.to_string()) }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::Serialization(e.to_string()) }
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::StoreCorrupt { path: path.into(), reason: reason.into() }
    }
}

/// Result type for docseek operations.
pub type Result<T> = std::result::Result<T, Error>;
