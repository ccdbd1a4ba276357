use crate::analyzer::{Analyzer, Language};
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::lock::WriteLock;
use crate::persist::{self, IndexPaths, MetaFile, FORMAT_VERSION};
use crate::schema::{Field, SCHEMA_FIELDS};
use crate::writer::{IndexWriter, ResourceLimits, DEFAULT_LOCK_TIMEOUT};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

/// One committed, immutable state of the index.
#[derive(Debug)]
pub struct IndexSnapshot {
    index: InvertedIndex,
    generation: u64,
    updated_at: String,
}

/// Point-in-time view used for querying. Cloning is cheap, and a reader
/// never observes commits that happen after it was taken.
#[derive(Debug, Clone)]
pub struct IndexReader {
    snapshot: Arc<IndexSnapshot>,
}

impl IndexReader {
    fn new(index: InvertedIndex, generation: u64, updated_at: String) -> Self {
        Self { snapshot: Arc::new(IndexSnapshot { index, generation, updated_at }) }
    }

    pub fn generation(&self) -> u64 { self.snapshot.generation }
    pub fn updated_at(&self) -> &str { &self.snapshot.updated_at }
}

impl Deref for IndexReader {
    type Target = InvertedIndex;
    fn deref(&self) -> &InvertedIndex { &self.snapshot.index }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub document_count: u32,
    pub size_on_disk: u64,
    pub generation: u64,
    pub last_updated: String,
}

/// Held by an open batch: the in-process mutex plus `write.lock`, so one
/// batch runs at a time across threads, handles and processes.
pub(crate) struct WriterGuard<'a> {
    _file: WriteLock,
    _local: MutexGuard<'a, ()>,
}

/// A single on-disk index directory. All mutation goes through
/// [`IndexStore::begin_batch`]; at most one batch is open at a time, even
/// when several handles or processes share the directory.
pub struct IndexStore {
    paths: IndexPaths,
    analyzer: Arc<Analyzer>,
    created_at: String,
    current: RwLock<IndexReader>,
    writer_lock: Mutex<()>,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into())
}

impl IndexStore {
    /// Open an existing index. Fails with `IndexNotFound` if none was ever
    /// created there.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        if !paths.meta().is_file() {
            if paths.has_index_artifacts()? {
                return Err(Error::corrupt(&paths.root, "index artifacts present but meta.json is missing"));
            }
            return Err(Error::IndexNotFound(paths.root));
        }
        let meta = persist::load_meta(&paths)?;
        let (meta, index) = persist::load_live(&paths, meta)?;
        remove_stale_if_idle(&paths);
        info!(path = %paths.root.display(), generation = meta.generation, num_docs = meta.num_docs, "opened index");
        Ok(Self::from_parts(paths, meta, index))
    }

    /// Open the index in `dir`, creating an empty one if none exists.
    /// An existing index keeps the language it was created with.
    pub fn open_or_create<P: AsRef<Path>>(dir: P, language: Language) -> Result<Self> {
        match Self::open(&dir) {
            Ok(store) => {
                if store.analyzer.language() != language {
                    warn!(stored = %store.analyzer.language(), configured = %language, "index was built with a different language; keeping the stored one");
                }
                Ok(store)
            }
            Err(Error::IndexNotFound(_)) => {
                let paths = IndexPaths::new(&dir);
                fs::create_dir_all(&paths.root)?;
                let lock = WriteLock::acquire(&paths.lock_file(), DEFAULT_LOCK_TIMEOUT)?;
                if paths.meta().is_file() {
                    // another process created it while we waited
                    drop(lock);
                    return Self::open(&dir);
                }
                let store = Self::create(paths, language);
                drop(lock);
                store
            }
            Err(e) => Err(e),
        }
    }

    fn create(paths: IndexPaths, language: Language) -> Result<Self> {
        let index = InvertedIndex::new();
        let now = now_rfc3339();
        let checksums = persist::save_generation(&paths, 0, &index)?;
        let meta = MetaFile {
            version: FORMAT_VERSION,
            fields: SCHEMA_FIELDS.iter().map(|s| s.to_string()).collect(),
            language,
            generation: 0,
            num_docs: 0,
            next_doc_id: 0,
            field_lengths: Default::default(),
            created_at: now.clone(),
            updated_at: now,
            checksums,
        };
        persist::save_meta(&paths, &meta)?;
        info!(path = %paths.root.display(), %language, "created empty index");
        Ok(Self::from_parts(paths, meta, index))
    }

    fn from_parts(paths: IndexPaths, meta: MetaFile, index: InvertedIndex) -> Self {
        Self {
            paths,
            analyzer: Arc::new(Analyzer::new(meta.language)),
            created_at: meta.created_at,
            current: RwLock::new(IndexReader::new(index, meta.generation, meta.updated_at)),
            writer_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path { &self.paths.root }

    pub(crate) fn paths(&self) -> &IndexPaths { &self.paths }

    /// The analyzer shared by indexing and querying for this index.
    pub fn analyzer(&self) -> &Arc<Analyzer> { &self.analyzer }

    /// The latest committed state, including commits made by other handles
    /// or processes. If the directory cannot be re-read, the last loaded
    /// state is returned.
    pub fn read_snapshot(&self) -> IndexReader {
        match self.refresh() {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %self.paths.root.display(), error = %e, "could not reload index, serving the loaded generation");
                self.current.read().clone()
            }
        }
    }

    /// Reload when `meta.json` names a newer generation than the one held.
    pub(crate) fn refresh(&self) -> Result<IndexReader> {
        let held = self.current.read().clone();
        let meta = persist::load_meta(&self.paths)?;
        if meta.generation <= held.generation() {
            return Ok(held);
        }
        let (meta, index) = persist::load_live(&self.paths, meta)?;
        debug!(from = held.generation(), to = meta.generation, "reloaded index committed elsewhere");
        Ok(self.install(IndexReader::new(index, meta.generation, meta.updated_at)))
    }

    /// Make `reader` current unless something newer already is.
    fn install(&self, reader: IndexReader) -> IndexReader {
        let mut slot = self.current.write();
        if slot.generation() < reader.generation() {
            *slot = reader;
        }
        slot.clone()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self.read_snapshot();
        Ok(StoreStats {
            document_count: reader.num_docs(),
            size_on_disk: persist::size_on_disk(&self.paths),
            generation: reader.generation(),
            last_updated: reader.updated_at().to_string(),
        })
    }

    /// Start a batch, waiting up to `limits.lock_timeout` for any other
    /// batch to finish.
    pub fn begin_batch(&self, limits: ResourceLimits) -> Result<IndexWriter<'_>> {
        IndexWriter::new(self, limits)
    }

    pub(crate) fn lock_writer(&self, timeout: Duration) -> Result<WriterGuard<'_>> {
        let started = Instant::now();
        let local = self.writer_lock.try_lock_for(timeout).ok_or(Error::WriterBusy(timeout))?;
        let file = match WriteLock::acquire(&self.paths.lock_file(), timeout.saturating_sub(started.elapsed())) {
            Ok(file) => file,
            Err(Error::WriterBusy(_)) => return Err(Error::WriterBusy(timeout)),
            Err(e) => return Err(e),
        };
        Ok(WriterGuard { _file: file, _local: local })
    }

    /// Persist `index` as generation `base + 1` and make it visible.
    /// Callers must hold the writer lock and have read `base` from disk
    /// under it. On error the previous generation stays both durable and
    /// visible.
    pub(crate) fn publish(&self, base: u64, index: InvertedIndex) -> Result<IndexReader> {
        let generation = base + 1;
        let updated_at = now_rfc3339();

        let checksums = persist::save_generation(&self.paths, generation, &index).map_err(|e| Error::Commit(e.to_string()))?;
        let meta = MetaFile {
            version: FORMAT_VERSION,
            fields: SCHEMA_FIELDS.iter().map(|s| s.to_string()).collect(),
            language: self.analyzer.language(),
            generation,
            num_docs: index.num_docs(),
            next_doc_id: index.next_doc_id(),
            field_lengths: Field::ALL.iter().map(|f| (f.name().to_string(), index.field_stats(*f).total_length)).collect(),
            created_at: self.created_at.clone(),
            updated_at: updated_at.clone(),
            checksums,
        };
        if let Err(e) = persist::save_meta(&self.paths, &meta) {
            let _ = fs::remove_dir_all(self.paths.generation_dir(generation));
            return Err(Error::Commit(e.to_string()));
        }

        let reader = self.install(IndexReader::new(index, generation, updated_at));
        if let Err(e) = fs::remove_dir_all(self.paths.generation_dir(base)) {
            debug!(error = %e, "could not remove previous generation");
        }
        Ok(reader)
    }
}

/// Leftovers of a crashed batch are only removed when no batch is running.
fn remove_stale_if_idle(paths: &IndexPaths) {
    match WriteLock::acquire(&paths.lock_file(), Duration::ZERO) {
        Ok(_lock) => match persist::load_meta(paths) {
            Ok(meta) => paths.remove_stale(meta.generation),
            Err(e) => debug!(error = %e, "skipping stale cleanup"),
        },
        Err(e) => debug!(error = %e, "batch in progress, leaving its files alone"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(IndexStore::open(dir.path()), Err(Error::IndexNotFound(_))));
        assert!(!dir.path().join("meta.json").exists());
    }

    #[test]
    fn create_then_reopen_keeps_language() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open_or_create(dir.path(), Language::Portuguese).unwrap();
        assert_eq!(store.read_snapshot().num_docs(), 0);
        drop(store);
        let reopened = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
        assert_eq!(reopened.analyzer().language(), Language::Portuguese);
    }

    #[test]
    fn partial_artifacts_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("gen-00000001")).unwrap();
        assert!(matches!(IndexStore::open_or_create(dir.path(), Language::English), Err(Error::StoreCorrupt { .. })));
    }

    #[test]
    fn garbage_meta_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meta.json"), "{ not json").unwrap();
        assert!(matches!(IndexStore::open(dir.path()), Err(Error::StoreCorrupt { .. })));
    }
}
