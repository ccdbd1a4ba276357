//! Directory-scoped bulk indexing: walk, extract, upsert, commit once.

use crate::error::Result;
use crate::extract::ExtractorRegistry;
use crate::schema::{now_timestamp, Document};
use crate::store::IndexStore;
use crate::writer::{ResourceLimits, UpsertKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Per-file errors beyond this many are dropped from the report.
pub const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingReport {
    pub message: String,
    /// Files whose path was not in the index before the batch.
    #[serde(rename = "indexed_files")]
    pub indexed_count: usize,
    #[serde(rename = "updated_files")]
    pub updated_count: usize,
    #[serde(rename = "total_time_seconds")]
    pub elapsed_seconds: f64,
    /// First [`MAX_REPORTED_ERRORS`] per-file problems.
    pub errors: Vec<String>,
}

/// Hidden files and office lock files (`~$report.docx`).
pub fn is_temp_file(name: &str) -> bool { name.starts_with('.') || name.starts_with("~$") }

/// Regular, non-temporary files under `root`, in a stable order.
pub fn candidate_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_temp_file(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect()
}

/// Index every supported file under `root` in one batch. Per-file problems
/// end up in the report; only a failed commit (or a busy writer) is an error.
pub fn index_directory(store: &IndexStore, extractors: &ExtractorRegistry, root: &Path, limits: ResourceLimits) -> Result<IndexingReport> {
    let started = Instant::now();
    let mut writer = store.begin_batch(limits)?;
    let batch_time = now_timestamp();
    let mut errors: Vec<String> = Vec::new();
    let (mut new, mut updated) = (0usize, 0usize);

    for path in candidate_files(root) {
        let Some(extractor) = extractors.for_path(&path) else {
            debug!(path = %path.display(), "no extractor, skipping");
            continue;
        };
        let content = match extractor.extract(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "extraction failed");
                errors.push(e.to_string());
                continue;
            }
        };
        if content.trim().is_empty() {
            warn!(path = %path.display(), "no content extracted");
            errors.push(format!("No content extracted from {}", path.display()));
            continue;
        }
        match writer.upsert(Document::from_file(&path, content, batch_time)) {
            Ok(UpsertKind::New) => new += 1,
            Ok(UpsertKind::Updated) => updated += 1,
            Err(e) => {
                error!(path = %path.display(), error = %e, "indexing error");
                errors.push(format!("Indexing error for {}: {e}", path.display()));
            }
        }
    }

    let report = writer.commit().map_err(|e| {
        error!(error = %e, root = %root.display(), "indexing batch failed");
        e
    })?;
    let elapsed = started.elapsed().as_secs_f64();
    info!(new, updated, num_docs = report.document_count, elapsed_secs = elapsed, "indexing completed");

    errors.truncate(MAX_REPORTED_ERRORS);
    Ok(IndexingReport {
        message: "Indexing completed successfully".into(),
        indexed_count: new,
        updated_count: updated,
        elapsed_seconds: (elapsed * 100.0).round() / 100.0,
        errors,
    })
}
