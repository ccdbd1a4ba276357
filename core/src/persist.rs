//! On-disk layout of an index directory.
//!
//! ```text
//! <root>/meta.json              live generation, schema, stats, checksums
//! <root>/gen-00000003/dictionary.bin
//! <root>/gen-00000003/postings.bin
//! <root>/gen-00000003/docs.bin
//! <root>/pending/               writer spill segments (transient)
//! <root>/write.lock             held by whichever process has a batch open
//! ```
//!
//! A commit writes a whole new generation directory and then swaps
//! `meta.json` with a rename; whatever `meta.json` names is the durable state.

use crate::analyzer::Language;
use crate::error::{Error, Result};
use crate::index::{DocId, InvertedIndex, Posting, StoredDocument};
use crate::schema::{Field, SCHEMA_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FORMAT_VERSION: u32 = 1;

const GENERATION_PREFIX: &str = "gen-";
const LEGACY_ARTIFACTS: [&str; 4] = ["dictionary.bin", "postings.bin", "docs.bin", "meta.json.tmp"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub dictionary: u32,
    pub postings: u32,
    pub docs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub fields: Vec<String>,
    pub language: Language,
    pub generation: u64,
    pub num_docs: u32,
    pub next_doc_id: DocId,
    /// Sum of analyzed lengths per field name.
    pub field_lengths: BTreeMap<String, u64>,
    pub created_at: String,
    pub updated_at: String,
    pub checksums: Checksums,
}

/// One term dictionary entry: where the postings of (field, term) live in
/// `postings.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TermEntry {
    field: Field,
    term: String,
    doc_freq: u32,
    offset: u64,
    len: u64,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
    pub fn generation_dir(&self, generation: u64) -> PathBuf { self.root.join(format!("{GENERATION_PREFIX}{generation:08}")) }
    pub fn pending_dir(&self) -> PathBuf { self.root.join("pending") }
    pub fn lock_file(&self) -> PathBuf { self.root.join("write.lock") }

    /// True if the directory holds anything this crate writes besides
    /// `meta.json` (used to tell "never created" from "half written").
    pub fn has_index_artifacts(&self) -> Result<bool> {
        if !self.root.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.starts_with(GENERATION_PREFIX) || LEGACY_ARTIFACTS.contains(&name.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Best-effort removal of generations other than `live` and of leftover
    /// spill segments. Only call this while holding the write lock.
    pub fn remove_stale(&self, live: u64) {
        let keep = self.generation_dir(live);
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_gen = entry.file_name().to_string_lossy().starts_with(GENERATION_PREFIX);
                if is_gen && path != keep && path.is_dir() {
                    match fs::remove_dir_all(&path) {
                        Ok(()) => debug!(path = %path.display(), "removed stale generation"),
                        Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale generation"),
                    }
                }
            }
        }
        let _ = fs::remove_dir_all(self.pending_dir());
    }
}

fn write_file_synced(path: &Path, bytes: &[u8]) -> Result<u32> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(crc32fast::hash(bytes))
}

fn sync_dir(dir: &Path) {
    // not supported everywhere (e.g. Windows); the rename is what matters
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

/// Write `index` as generation `generation`. Fails if that directory
/// already exists; a directory this call created is removed again on error.
pub fn save_generation(paths: &IndexPaths, generation: u64, index: &InvertedIndex) -> Result<Checksums> {
    let dir = paths.generation_dir(generation);
    fs::create_dir(&dir)?;
    let written = write_generation(&dir, index);
    if written.is_err() {
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "could not remove partial generation");
        }
    }
    written
}

fn write_generation(dir: &Path, index: &InvertedIndex) -> Result<Checksums> {
    let mut entries: Vec<TermEntry> = Vec::with_capacity(index.num_terms());
    let mut postings_buf: Vec<u8> = Vec::new();
    for (field, dict) in &index.terms {
        let mut terms: Vec<(&String, &Vec<Posting>)> = dict.iter().collect();
        terms.sort_by(|a, b| a.0.cmp(b.0));
        for (term, list) in terms {
            let bytes = bincode::serialize(list)?;
            entries.push(TermEntry {
                field: *field,
                term: term.clone(),
                doc_freq: list.len() as u32,
                offset: postings_buf.len() as u64,
                len: bytes.len() as u64,
            });
            postings_buf.extend_from_slice(&bytes);
        }
    }

    let docs: Vec<(&DocId, &StoredDocument)> = index.docs.iter().collect();
    let checksums = Checksums {
        dictionary: write_file_synced(&dir.join("dictionary.bin"), &bincode::serialize(&entries)?)?,
        postings: write_file_synced(&dir.join("postings.bin"), &postings_buf)?,
        docs: write_file_synced(&dir.join("docs.bin"), &bincode::serialize(&docs)?)?,
    };
    sync_dir(dir);
    Ok(checksums)
}

fn read_checked(paths: &IndexPaths, dir: &Path, name: &str, expected: u32) -> Result<Vec<u8>> {
    let file = dir.join(name);
    let bytes = fs::read(&file).map_err(|e| Error::corrupt(&paths.root, format!("cannot read {}: {e}", file.display())))?;
    if crc32fast::hash(&bytes) != expected {
        return Err(Error::corrupt(&paths.root, format!("checksum mismatch in {}", file.display())));
    }
    Ok(bytes)
}

/// Load the generation named by `meta` into memory.
pub fn load_generation(paths: &IndexPaths, meta: &MetaFile) -> Result<InvertedIndex> {
    let dir = paths.generation_dir(meta.generation);
    if !dir.is_dir() {
        return Err(Error::corrupt(&paths.root, format!("generation {} is missing", meta.generation)));
    }
    let decode_err = |what: &str, e: bincode::Error| Error::corrupt(&paths.root, format!("cannot decode {what}: {e}"));

    let dict_bytes = read_checked(paths, &dir, "dictionary.bin", meta.checksums.dictionary)?;
    let postings_bytes = read_checked(paths, &dir, "postings.bin", meta.checksums.postings)?;
    let docs_bytes = read_checked(paths, &dir, "docs.bin", meta.checksums.docs)?;

    let entries: Vec<TermEntry> = bincode::deserialize(&dict_bytes).map_err(|e| decode_err("dictionary", e))?;
    let docs: Vec<(DocId, StoredDocument)> = bincode::deserialize(&docs_bytes).map_err(|e| decode_err("stored fields", e))?;

    let mut index = InvertedIndex::new();
    for entry in entries {
        let start = entry.offset as usize;
        let end = start.checked_add(entry.len as usize).filter(|&end| end <= postings_bytes.len());
        let Some(end) = end else {
            return Err(Error::corrupt(&paths.root, format!("postings of {:?}:{} out of range", entry.field, entry.term)));
        };
        let list: Vec<Posting> = bincode::deserialize(&postings_bytes[start..end]).map_err(|e| decode_err("postings", e))?;
        if list.len() as u32 != entry.doc_freq {
            return Err(Error::corrupt(&paths.root, format!("doc frequency mismatch for {:?}:{}", entry.field, entry.term)));
        }
        index.terms.entry(entry.field).or_insert_with(HashMap::new).insert(entry.term, list);
    }
    for (doc_id, stored) in docs {
        index.paths.insert(stored.doc.path.clone(), doc_id);
        index.docs.insert(doc_id, stored);
    }
    if index.num_docs() != meta.num_docs {
        return Err(Error::corrupt(&paths.root, format!("expected {} documents, found {}", meta.num_docs, index.num_docs())));
    }
    for field in Field::ALL {
        let total = meta.field_lengths.get(field.name()).copied().unwrap_or(0);
        index.field_lengths.insert(field, total);
    }
    index.next_doc_id = meta.next_doc_id;
    Ok(index)
}

/// Load the generation `meta` names. If it vanished because another
/// process committed in the meantime, follow `meta.json` to the newer one.
pub fn load_live(paths: &IndexPaths, mut meta: MetaFile) -> Result<(MetaFile, InvertedIndex)> {
    loop {
        match load_generation(paths, &meta) {
            Ok(index) => return Ok((meta, index)),
            Err(e) => {
                let latest = load_meta(paths)?;
                if latest.generation == meta.generation {
                    return Err(e);
                }
                debug!(from = meta.generation, to = latest.generation, "generation moved while loading");
                meta = latest;
            }
        }
    }
}

/// Atomically replace `meta.json`.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    write_file_synced(&paths.meta_tmp(), json.as_bytes())?;
    fs::rename(paths.meta_tmp(), paths.meta())?;
    sync_dir(&paths.root);
    Ok(())
}

/// Read and validate `meta.json` against the schema this build expects.
pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let raw = fs::read_to_string(paths.meta())?;
    let meta: MetaFile = serde_json::from_str(&raw).map_err(|e| Error::corrupt(&paths.root, format!("unreadable meta.json: {e}")))?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::corrupt(&paths.root, format!("unsupported format version {}", meta.version)));
    }
    if meta.fields.iter().map(|s| s.as_str()).ne(SCHEMA_FIELDS.iter().copied()) {
        return Err(Error::corrupt(&paths.root, format!("incompatible schema {:?}", meta.fields)));
    }
    Ok(meta)
}

/// Total size in bytes of every file under the index directory.
pub fn size_on_disk(paths: &IndexPaths) -> u64 {
    walkdir::WalkDir::new(&paths.root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::index::AnalyzedDocument;
    use crate::schema::Document;

    fn meta_for(index: &InvertedIndex, generation: u64, checksums: Checksums) -> MetaFile {
        MetaFile {
            version: FORMAT_VERSION,
            fields: SCHEMA_FIELDS.iter().map(|s| s.to_string()).collect(),
            language: Language::English,
            generation,
            num_docs: index.num_docs(),
            next_doc_id: index.next_doc_id(),
            field_lengths: Field::ALL.iter().map(|f| (f.name().to_string(), index.field_stats(*f).total_length)).collect(),
            created_at: String::new(),
            updated_at: String::new(),
            checksums,
        }
    }

    #[test]
    fn generation_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let analyzer = Analyzer::new(Language::English);
        let mut index = InvertedIndex::new();
        index.add_document(AnalyzedDocument::analyze(Document::new("/a", "a.txt", "alpha beta", "txt"), &analyzer));
        index.add_document(AnalyzedDocument::analyze(Document::new("/b", "b.txt", "beta gamma", "txt"), &analyzer));

        let sums = save_generation(&paths, 1, &index).unwrap();
        let meta = meta_for(&index, 1, sums);
        save_meta(&paths, &meta).unwrap();

        let loaded = load_generation(&paths, &load_meta(&paths).unwrap()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn flipped_byte_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::new();
        let sums = save_generation(&paths, 0, &index).unwrap();
        let meta = meta_for(&index, 0, sums);
        fs::write(paths.generation_dir(0).join("docs.bin"), b"garbage").unwrap();
        assert!(matches!(load_generation(&paths, &meta), Err(Error::StoreCorrupt { .. })));
    }

    #[test]
    fn existing_generation_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::new();
        save_generation(&paths, 2, &index).unwrap();
        assert!(save_generation(&paths, 2, &index).is_err());
        assert!(paths.generation_dir(2).join("docs.bin").is_file());
    }

    #[test]
    fn loading_follows_a_newer_generation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let analyzer = Analyzer::new(Language::English);
        let empty = InvertedIndex::new();
        let stale = meta_for(&empty, 1, save_generation(&paths, 1, &empty).unwrap());

        let mut index = InvertedIndex::new();
        index.add_document(AnalyzedDocument::analyze(Document::new("/a", "a.txt", "alpha", "txt"), &analyzer));
        let sums = save_generation(&paths, 2, &index).unwrap();
        save_meta(&paths, &meta_for(&index, 2, sums)).unwrap();
        fs::remove_dir_all(paths.generation_dir(1)).unwrap();

        let (meta, loaded) = load_live(&paths, stale).unwrap();
        assert_eq!(meta.generation, 2);
        assert_eq!(loaded, index);
    }

    #[test]
    fn artifacts_without_meta_are_noticed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();
        assert!(!paths.has_index_artifacts().unwrap());
        fs::create_dir(paths.generation_dir(4)).unwrap();
        assert!(paths.has_index_artifacts().unwrap());
    }
}
