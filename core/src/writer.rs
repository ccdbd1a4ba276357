use crate::error::{Error, Result};
use crate::index::{AnalyzedDocument, DocId, InvertedIndex};
use crate::schema::Document;
use crate::store::{IndexReader, IndexStore, WriterGuard};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MEMORY_LIMIT_MB: usize = 256;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Buffered analyzed data above this size is spilled to a partial segment.
    pub memory_limit_bytes: usize,
    /// How long `begin_batch` waits for a running batch before giving up.
    pub lock_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { memory_limit_bytes: DEFAULT_MEMORY_LIMIT_MB * 1024 * 1024, lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertKind {
    New,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitReport {
    pub new_count: usize,
    pub updated_count: usize,
    /// Rejected documents; these never abort the batch.
    pub failures: Vec<String>,
    pub document_count: u32,
    pub generation: u64,
    pub spilled_segments: usize,
    pub elapsed: Duration,
}

/// Latest staged version of a path.
#[derive(Debug, Clone, Copy)]
struct Staged {
    kind: UpsertKind,
    /// Position among all staged documents, spilled ones included.
    ordinal: usize,
}

/// An open batch. Upserts are staged and invisible to readers until
/// [`IndexWriter::commit`]; dropping the writer aborts the batch.
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    _guard: WriterGuard<'a>,
    base: IndexReader,
    existing_paths: HashSet<String>,
    limits: ResourceLimits,
    buffer: Vec<AnalyzedDocument>,
    buffer_bytes: usize,
    spills: Vec<PathBuf>,
    staged: HashMap<String, Staged>,
    staged_total: usize,
    failures: Vec<String>,
    poisoned: Option<String>,
    started: Instant,
}

impl<'a> IndexWriter<'a> {
    pub(crate) fn new(store: &'a IndexStore, limits: ResourceLimits) -> Result<Self> {
        let guard = store.lock_writer(limits.lock_timeout)?;
        // another process may have committed since this handle last looked
        let base = store.refresh()?;
        // leftovers of a batch that never finished
        store.paths().remove_stale(base.generation());
        let existing_paths = base.paths().map(|p| p.to_string()).collect();
        debug!(generation = base.generation(), "batch started");
        Ok(Self {
            store,
            _guard: guard,
            base,
            existing_paths,
            limits,
            buffer: Vec::new(),
            buffer_bytes: 0,
            spills: Vec::new(),
            staged: HashMap::new(),
            staged_total: 0,
            failures: Vec::new(),
            poisoned: None,
            started: Instant::now(),
        })
    }

    /// Distinct paths staged so far.
    pub fn staged_count(&self) -> usize { self.staged.len() }

    /// Stage a document. It counts as `Updated` if its path was live when the
    /// batch started; staging the same path twice keeps the last version.
    pub fn upsert(&mut self, doc: Document) -> Result<UpsertKind> {
        if doc.path.trim().is_empty() {
            let err = Error::InvalidDocument("document path is empty".into());
            self.failures.push(err.to_string());
            return Err(err);
        }
        let kind = if self.existing_paths.contains(&doc.path) { UpsertKind::Updated } else { UpsertKind::New };
        self.staged.insert(doc.path.clone(), Staged { kind, ordinal: self.staged_total });
        self.staged_total += 1;
        let analyzed = AnalyzedDocument::analyze(doc, self.store.analyzer());
        self.buffer_bytes += analyzed.estimated_bytes();
        self.buffer.push(analyzed);
        if self.buffer_bytes > self.limits.memory_limit_bytes {
            if let Err(e) = self.flush_segment() {
                let reason = format!("spilling partial segment failed: {e}");
                self.poisoned = Some(reason.clone());
                return Err(Error::Commit(reason));
            }
        }
        Ok(kind)
    }

    fn flush_segment(&mut self) -> Result<()> {
        let dir = self.store.paths().pending_dir();
        fs::create_dir_all(&dir)?;
        let file = dir.join(format!("segment-{:04}.bin", self.spills.len()));
        fs::write(&file, bincode::serialize(&self.buffer)?)?;
        debug!(docs = self.buffer.len(), bytes = self.buffer_bytes, file = %file.display(), "spilled partial segment");
        self.spills.push(file);
        self.buffer.clear();
        self.buffer_bytes = 0;
        Ok(())
    }

    /// Add every document of `docs` that is the last staged version of
    /// its path. `ordinal` is the position of `docs[0]` in staging order.
    fn merge(&self, index: &mut InvertedIndex, docs: Vec<AnalyzedDocument>, ordinal: &mut usize) {
        for doc in docs {
            if self.staged.get(&doc.doc.path).is_some_and(|s| s.ordinal == *ordinal) {
                index.add_document(doc);
            }
            *ordinal += 1;
        }
    }

    /// Replace every staged path, add the new documents, and publish the
    /// result as one new generation. Spilled segments are read back one at
    /// a time. On failure nothing becomes visible.
    pub fn commit(mut self) -> Result<CommitReport> {
        if let Some(reason) = self.poisoned.take() {
            return Err(Error::Commit(reason));
        }

        let mut index = (*self.base).clone();
        let replaced: HashSet<DocId> = self
            .staged
            .iter()
            .filter(|(_, s)| s.kind == UpsertKind::Updated)
            .filter_map(|(path, _)| index.doc_id_for_path(path))
            .collect();
        index.remove_documents(&replaced);

        let mut ordinal = 0;
        for file in &self.spills {
            let segment: Vec<AnalyzedDocument> = fs::read(file)
                .map_err(Error::from)
                .and_then(|bytes| Ok(bincode::deserialize(&bytes)?))
                .map_err(|e| Error::Commit(format!("reading staged segment {}: {e}", file.display())))?;
            self.merge(&mut index, segment, &mut ordinal);
        }
        let buffered = std::mem::take(&mut self.buffer);
        self.merge(&mut index, buffered, &mut ordinal);

        let reader = self.store.publish(self.base.generation(), index)?;
        let updated_count = self.staged.values().filter(|s| s.kind == UpsertKind::Updated).count();
        let report = CommitReport {
            new_count: self.staged.len() - updated_count,
            updated_count,
            failures: std::mem::take(&mut self.failures),
            document_count: reader.num_docs(),
            generation: reader.generation(),
            spilled_segments: self.spills.len(),
            elapsed: self.started.elapsed(),
        };
        info!(
            new = report.new_count,
            updated = report.updated_count,
            replaced = replaced.len(),
            num_docs = report.document_count,
            generation = report.generation,
            "commit complete"
        );
        Ok(report)
    }
}

impl Drop for IndexWriter<'_> {
    fn drop(&mut self) {
        for file in &self.spills {
            if let Err(e) = fs::remove_file(file) {
                warn!(file = %file.display(), error = %e, "could not remove spilled segment");
            }
        }
        let _ = fs::remove_dir(self.store.paths().pending_dir());
    }
}
