use crate::analyzer::Analyzer;
use crate::schema::{Document, Field};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Term frequency within the field.
    pub tf: u32,
    /// Word positions within the field, ascending.
    pub positions: Vec<u32>,
}

/// Stored fields of a live document plus its analyzed field lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc: Document,
    pub title_len: u32,
    pub content_len: u32,
}

impl StoredDocument {
    pub fn field_length(&self, field: Field) -> u32 {
        match field {
            Field::Title => self.title_len,
            Field::Content => self.content_len,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldStats {
    pub doc_count: u32,
    pub total_length: u64,
}

impl FieldStats {
    /// Average analyzed length, never below 1 so it can divide safely.
    pub fn avg_length(&self) -> f32 {
        if self.doc_count == 0 || self.total_length == 0 {
            return 1.0;
        }
        self.total_length as f32 / self.doc_count as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedField {
    pub field: Field,
    /// Number of terms kept after analysis.
    pub length: u32,
    pub terms: BTreeMap<String, Vec<u32>>,
}

/// A document after analysis, before it has been assigned a `DocId`.
/// This is what the writer buffers and spills to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    pub doc: Document,
    pub fields: Vec<AnalyzedField>,
}

impl AnalyzedDocument {
    pub fn analyze(doc: Document, analyzer: &Analyzer) -> Self {
        let fields = Field::ALL
            .iter()
            .map(|&field| {
                let tokens = analyzer.analyze(doc.text(field));
                let length = tokens.len() as u32;
                let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
                for (term, pos) in tokens {
                    terms.entry(term).or_default().push(pos);
                }
                AnalyzedField { field, length, terms }
            })
            .collect();
        Self { doc, fields }
    }

    /// Rough in-memory footprint, used against the writer's memory budget.
    pub fn estimated_bytes(&self) -> usize {
        let stored = self.doc.path.len() + self.doc.title.len() + self.doc.content.len() + self.doc.file_type.len();
        let postings: usize = self
            .fields
            .iter()
            .flat_map(|f| f.terms.iter())
            .map(|(term, positions)| term.len() + positions.len() * 4 + 48)
            .sum();
        stored + postings + 64
    }

    fn length(&self, field: Field) -> u32 {
        self.fields.iter().find(|f| f.field == field).map(|f| f.length).unwrap_or(0)
    }
}

/// The term dictionary, postings and stored fields of one committed
/// generation. Documents are referenced by `DocId`, which is never reused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedIndex {
    pub(crate) terms: BTreeMap<Field, HashMap<String, Vec<Posting>>>, // postings sorted by doc_id
    pub(crate) docs: BTreeMap<DocId, StoredDocument>,
    pub(crate) paths: HashMap<String, DocId>,
    pub(crate) field_lengths: BTreeMap<Field, u64>,
    pub(crate) next_doc_id: DocId,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    pub fn num_terms(&self) -> usize { self.terms.values().map(|m| m.len()).sum() }

    pub fn doc_id_for_path(&self, path: &str) -> Option<DocId> { self.paths.get(path).copied() }

    pub fn document(&self, doc_id: DocId) -> Option<&StoredDocument> { self.docs.get(&doc_id) }

    pub fn documents(&self) -> impl Iterator<Item = (DocId, &StoredDocument)> {
        self.docs.iter().map(|(id, d)| (*id, d))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> { self.paths.keys().map(|p| p.as_str()) }

    pub fn postings(&self, field: Field, term: &str) -> &[Posting] {
        self.terms.get(&field).and_then(|m| m.get(term)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn posting(&self, field: Field, term: &str, doc_id: DocId) -> Option<&Posting> {
        let list = self.postings(field, term);
        list.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| &list[i])
    }

    pub fn doc_freq(&self, field: Field, term: &str) -> u32 { self.postings(field, term).len() as u32 }

    pub fn field_stats(&self, field: Field) -> FieldStats {
        FieldStats { doc_count: self.num_docs(), total_length: self.field_lengths.get(&field).copied().unwrap_or(0) }
    }

    pub(crate) fn next_doc_id(&self) -> DocId { self.next_doc_id }

    /// Drop the documents and every posting that references them.
    pub(crate) fn remove_documents(&mut self, ids: &HashSet<DocId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            if let Some(stored) = self.docs.remove(id) {
                self.paths.remove(&stored.doc.path);
                for field in Field::ALL {
                    let total = self.field_lengths.entry(field).or_insert(0);
                    *total = total.saturating_sub(stored.field_length(field) as u64);
                }
            }
        }
        for postings in self.terms.values_mut() {
            postings.retain(|_, list| {
                list.retain(|p| !ids.contains(&p.doc_id));
                !list.is_empty()
            });
        }
    }

    /// Add a document under a fresh id. A live document with the same path
    /// is removed first, so a path never maps to two documents.
    pub(crate) fn add_document(&mut self, analyzed: AnalyzedDocument) -> DocId {
        if let Some(old) = self.doc_id_for_path(&analyzed.doc.path) {
            self.remove_documents(&HashSet::from([old]));
        }
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;

        let title_len = analyzed.length(Field::Title);
        let content_len = analyzed.length(Field::Content);
        for f in analyzed.fields {
            *self.field_lengths.entry(f.field).or_insert(0) += f.length as u64;
            let dict = self.terms.entry(f.field).or_default();
            for (term, positions) in f.terms {
                // ids only grow, so pushing keeps each list sorted
                dict.entry(term).or_default().push(Posting { doc_id, tf: positions.len() as u32, positions });
            }
        }
        self.paths.insert(analyzed.doc.path.clone(), doc_id);
        self.docs.insert(doc_id, StoredDocument { doc: analyzed.doc, title_len, content_len });
        doc_id
    }
}
