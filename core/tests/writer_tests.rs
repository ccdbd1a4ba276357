use docseek_core::{CommitReport, Document, Error, Field, IndexReader, IndexStore, Language, ResourceLimits, UpsertKind};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn doc(path: &str, content: &str) -> Document {
    let title = path.rsplit('/').next().unwrap_or(path);
    Document::new(path, title, content, "txt")
}

fn commit_all(store: &IndexStore, docs: Vec<Document>) -> CommitReport {
    let mut writer = store.begin_batch(ResourceLimits::default()).unwrap();
    for d in docs {
        writer.upsert(d).unwrap();
    }
    writer.commit().unwrap()
}

/// Paths of the documents whose content contains `word`.
fn paths_with(store: &IndexStore, reader: &IndexReader, word: &str) -> Vec<String> {
    let term = store.analyzer().normalize_word(word).unwrap();
    reader
        .postings(Field::Content, &term)
        .iter()
        .map(|p| reader.document(p.doc_id).unwrap().doc.path.clone())
        .collect()
}

#[test]
fn upsert_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let first = commit_all(&store, vec![doc("/x", "alpha beta")]);
    let second = commit_all(&store, vec![doc("/x", "alpha beta")]);
    assert_eq!((first.new_count, first.updated_count), (1, 0));
    assert_eq!((second.new_count, second.updated_count), (0, 1));

    let reader = store.read_snapshot();
    assert_eq!(reader.num_docs(), 1);
    assert_eq!(paths_with(&store, &reader, "alpha"), vec!["/x"]);
    assert_eq!(reader.field_stats(Field::Content).total_length, 2);
}

#[test]
fn update_replaces_old_postings() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    commit_all(&store, vec![doc("/x", "obsolete wording")]);
    let old_id = store.read_snapshot().doc_id_for_path("/x").unwrap();
    commit_all(&store, vec![doc("/x", "fresh content")]);

    let reader = store.read_snapshot();
    assert!(paths_with(&store, &reader, "obsolete").is_empty());
    assert_eq!(paths_with(&store, &reader, "fresh"), vec!["/x"]);
    assert_eq!(store.stats().unwrap().document_count, 1);
    // ids are never reused
    assert!(reader.doc_id_for_path("/x").unwrap() > old_id);
    assert!(reader.document(old_id).is_none());
}

#[test]
fn readers_keep_their_snapshot() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let before = store.read_snapshot();

    let mut writer = store.begin_batch(ResourceLimits::default()).unwrap();
    assert_eq!(writer.upsert(doc("/a", "alpha")).unwrap(), UpsertKind::New);
    assert_eq!(writer.staged_count(), 1);
    // staged, not visible
    assert_eq!(store.read_snapshot().num_docs(), 0);
    writer.commit().unwrap();

    assert_eq!(before.num_docs(), 0);
    let after = store.read_snapshot();
    assert_eq!(after.num_docs(), 1);
    assert_eq!(after.generation(), before.generation() + 1);
}

#[test]
fn second_batch_fails_with_writer_busy() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let _open = store.begin_batch(ResourceLimits::default()).unwrap();
    let limits = ResourceLimits { lock_timeout: Duration::from_millis(50), ..Default::default() };
    assert!(matches!(store.begin_batch(limits), Err(Error::WriterBusy(_))));
}

#[test]
fn batches_serialize_across_threads() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let limits = ResourceLimits { lock_timeout: Duration::from_secs(10), ..Default::default() };
    std::thread::scope(|s| {
        for i in 0..4 {
            let store = &store;
            s.spawn(move || {
                let mut writer = store.begin_batch(limits).unwrap();
                writer.upsert(doc(&format!("/doc{i}"), "shared words")).unwrap();
                std::thread::sleep(Duration::from_millis(20));
                writer.commit().unwrap();
            });
        }
    });
    let reader = store.read_snapshot();
    assert_eq!(reader.num_docs(), 4);
    assert_eq!(reader.generation(), 4);
}

#[test]
fn committed_state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = IndexStore::open_or_create(dir.path(), Language::Portuguese).unwrap();
        commit_all(&store, vec![doc("/a.txt", "documentos de teste"), doc("/b.txt", "outro documento")]);
    }
    let store = IndexStore::open(dir.path()).unwrap();
    let reader = store.read_snapshot();
    assert_eq!(store.analyzer().language(), Language::Portuguese);
    assert_eq!(reader.num_docs(), 2);
    let mut hits = paths_with(&store, &reader, "documento");
    hits.sort();
    assert_eq!(hits, vec!["/a.txt", "/b.txt"]);

    // new ids continue after the persisted ones
    commit_all(&store, vec![doc("/c.txt", "mais um")]);
    assert_eq!(store.read_snapshot().doc_id_for_path("/c.txt"), Some(2));
}

#[test]
fn failed_commit_keeps_previous_state() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    commit_all(&store, vec![doc("/a", "alpha")]);
    let generation = store.read_snapshot().generation();

    // a plain file where the next generation directory must go
    let blocker = dir.path().join(format!("gen-{:08}", generation + 1));
    fs::write(&blocker, b"in the way").unwrap();

    let mut writer = store.begin_batch(ResourceLimits::default()).unwrap();
    writer.upsert(doc("/b", "beta")).unwrap();
    writer.upsert(doc("/a", "replaced")).unwrap();
    assert!(matches!(writer.commit(), Err(Error::Commit(_))));

    let reader = store.read_snapshot();
    assert_eq!(reader.generation(), generation);
    assert_eq!(reader.num_docs(), 1);
    assert_eq!(paths_with(&store, &reader, "alpha"), vec!["/a"]);
    drop(store);

    let reopened = IndexStore::open(dir.path()).unwrap();
    assert_eq!(reopened.read_snapshot().num_docs(), 1);

    // the same batch goes through once the obstacle is gone
    fs::remove_file(&blocker).unwrap();
    let report = commit_all(&reopened, vec![doc("/b", "beta"), doc("/a", "replaced")]);
    assert_eq!((report.new_count, report.updated_count), (1, 1));
    assert_eq!(reopened.read_snapshot().num_docs(), 2);
}

#[test]
fn memory_budget_spills_partial_segments() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let limits = ResourceLimits { memory_limit_bytes: 1, ..Default::default() };

    let mut writer = store.begin_batch(limits).unwrap();
    for i in 0..3 {
        writer.upsert(doc(&format!("/s{i}"), "spilled text")).unwrap();
    }
    assert!(dir.path().join("pending").is_dir());
    let report = writer.commit().unwrap();
    assert_eq!(report.spilled_segments, 3);
    assert_eq!(report.document_count, 3);
    assert!(!dir.path().join("pending").exists());

    let reader = store.read_snapshot();
    assert_eq!(paths_with(&store, &reader, "spilled").len(), 3);
}

#[test]
fn dropped_batch_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let limits = ResourceLimits { memory_limit_bytes: 1, ..Default::default() };
    {
        let mut writer = store.begin_batch(limits).unwrap();
        writer.upsert(doc("/gone", "never committed")).unwrap();
    }
    assert!(!dir.path().join("pending").exists());
    assert_eq!(store.read_snapshot().num_docs(), 0);
    // the lock was released
    assert!(store.begin_batch(ResourceLimits::default()).is_ok());
}

#[test]
fn same_path_twice_in_a_batch_keeps_the_last() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let report = commit_all(&store, vec![doc("/x", "first draft"), doc("/x", "second version")]);
    assert_eq!((report.new_count, report.updated_count), (1, 0));

    let reader = store.read_snapshot();
    assert_eq!(reader.num_docs(), 1);
    assert!(paths_with(&store, &reader, "draft").is_empty());
    assert_eq!(paths_with(&store, &reader, "version"), vec!["/x"]);
}

#[test]
fn rejected_document_does_not_abort_batch() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let mut writer = store.begin_batch(ResourceLimits::default()).unwrap();
    assert!(matches!(writer.upsert(doc("  ", "no path")), Err(Error::InvalidDocument(_))));
    writer.upsert(doc("/ok", "fine")).unwrap();
    let report = writer.commit().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.new_count, 1);
    assert_eq!(store.read_snapshot().num_docs(), 1);
}

#[test]
fn handles_on_one_directory_share_the_writer_lock() {
    let dir = tempdir().unwrap();
    let server = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let cli = IndexStore::open(dir.path()).unwrap();
    let limits = ResourceLimits { lock_timeout: Duration::from_millis(50), ..Default::default() };

    let mut batch = cli.begin_batch(limits).unwrap();
    assert!(matches!(server.begin_batch(limits), Err(Error::WriterBusy(_))));
    batch.upsert(doc("/a", "alpha")).unwrap();
    assert_eq!(batch.commit().unwrap().generation, 1);

    // committed through the other handle, visible here
    let reader = server.read_snapshot();
    assert_eq!(reader.generation(), 1);
    assert_eq!(paths_with(&server, &reader, "alpha"), vec!["/a"]);

    let mut batch = server.begin_batch(limits).unwrap();
    assert_eq!(batch.upsert(doc("/a", "alpha again")).unwrap(), UpsertKind::Updated);
    batch.upsert(doc("/b", "beta")).unwrap();
    let report = batch.commit().unwrap();
    assert_eq!((report.generation, report.document_count), (2, 2));
    assert_eq!(cli.read_snapshot().num_docs(), 2);

    drop((server, cli));
    let reopened = IndexStore::open(dir.path()).unwrap();
    assert_eq!(reopened.read_snapshot().generation(), 2);
    assert_eq!(reopened.read_snapshot().num_docs(), 2);
}

#[test]
fn opening_during_a_batch_keeps_its_spilled_segments() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let limits = ResourceLimits { memory_limit_bytes: 1, ..Default::default() };

    let mut writer = store.begin_batch(limits).unwrap();
    writer.upsert(doc("/s0", "spilled text")).unwrap();
    writer.upsert(doc("/s1", "spilled text")).unwrap();
    let other = IndexStore::open(dir.path()).unwrap();
    assert!(dir.path().join("pending").join("segment-0000.bin").is_file());

    let report = writer.commit().unwrap();
    assert_eq!((report.spilled_segments, report.document_count), (2, 2));
    assert_eq!(other.read_snapshot().num_docs(), 2);
}

#[test]
fn last_version_wins_across_spilled_segments() {
    let dir = tempdir().unwrap();
    let store = IndexStore::open_or_create(dir.path(), Language::English).unwrap();
    let limits = ResourceLimits { memory_limit_bytes: 1, ..Default::default() };

    let mut writer = store.begin_batch(limits).unwrap();
    writer.upsert(doc("/x", "first draft")).unwrap();
    writer.upsert(doc("/y", "unrelated")).unwrap();
    writer.upsert(doc("/x", "second version")).unwrap();
    let report = writer.commit().unwrap();
    assert_eq!((report.new_count, report.spilled_segments), (2, 3));

    let reader = store.read_snapshot();
    assert_eq!(reader.num_docs(), 2);
    assert!(paths_with(&store, &reader, "draft").is_empty());
    assert_eq!(paths_with(&store, &reader, "version"), vec!["/x"]);
    // ids follow the position of the surviving version
    assert!(reader.doc_id_for_path("/y").unwrap() < reader.doc_id_for_path("/x").unwrap());
}
