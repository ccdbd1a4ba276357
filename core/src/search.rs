//! BM25F ranking over an [`InvertedIndex`].

use crate::index::{DocId, InvertedIndex, Posting};
use crate::query::{Clause, Query};
use crate::schema::Field;
use std::collections::HashMap;

/// Term frequency saturation.
pub const BM25_K1: f32 = 1.5;
/// Length normalization.
pub const BM25_B: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: BM25_K1, b: BM25_B } }
}

/// `ln(N / (df + 1)) + 1`; stays positive because `df <= N`.
pub fn idf(doc_count: u32, doc_freq: u32) -> f32 {
    ((doc_count.max(1) as f32) / (doc_freq as f32 + 1.0)).ln() + 1.0
}

/// Saturated, length-normalized term frequency.
pub fn tf_norm(tf: f32, field_len: u32, avg_len: f32, params: Bm25Params) -> f32 {
    let norm = 1.0 - params.b + params.b * (field_len as f32 / avg_len);
    (tf * (params.k1 + 1.0)) / (tf + params.k1 * norm)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedHits {
    /// Best first, at most the requested limit.
    pub hits: Vec<ScoredDoc>,
    /// Number of matching documents before the limit was applied.
    pub total: usize,
}

pub struct Searcher<'r> {
    index: &'r InvertedIndex,
    params: Bm25Params,
}

impl<'r> Searcher<'r> {
    pub fn new(index: &'r InvertedIndex) -> Self { Self { index, params: Bm25Params::default() } }

    pub fn with_params(index: &'r InvertedIndex, params: Bm25Params) -> Self { Self { index, params } }

    /// Evaluate `query` and return the `limit` best documents. Ties are broken
    /// by ascending document id so pages are stable.
    pub fn search(&self, query: &Query, limit: usize) -> RankedHits {
        if query.is_empty() {
            return RankedHits::default();
        }
        let mut acc: Option<HashMap<DocId, f32>> = None;
        for clause in &query.required {
            let scores = self.clause_scores(clause, &query.fields);
            let merged = match acc {
                None => scores,
                Some(prev) => prev.into_iter().filter_map(|(d, s)| scores.get(&d).map(|s2| (d, s + s2))).collect(),
            };
            let done = merged.is_empty();
            acc = Some(merged);
            if done { break; }
        }
        let mut matched = acc.unwrap_or_default();
        for clause in &query.excluded {
            for doc_id in self.clause_scores(clause, &query.fields).keys() {
                matched.remove(doc_id);
            }
        }

        let mut scored: Vec<ScoredDoc> = matched.into_iter().map(|(doc_id, score)| ScoredDoc { doc_id, score }).collect();
        let total = scored.len();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        scored.truncate(limit);
        RankedHits { hits: scored, total }
    }

    /// Score of every document matching `clause` in at least one field,
    /// summed over fields.
    fn clause_scores(&self, clause: &Clause, fields: &[(Field, f32)]) -> HashMap<DocId, f32> {
        let mut scores: HashMap<DocId, f32> = HashMap::new();
        let n = self.index.num_docs();
        for &(field, boost) in fields {
            let avg = self.index.field_stats(field).avg_length();
            match clause {
                Clause::Term(term) => {
                    let postings = self.index.postings(field, term);
                    if postings.is_empty() { continue; }
                    let w = boost * idf(n, postings.len() as u32);
                    for p in postings {
                        *scores.entry(p.doc_id).or_insert(0.0) += w * self.tf_part(p.tf as f32, p.doc_id, field, avg);
                    }
                }
                Clause::Phrase(parts) => {
                    let lists: Vec<&[Posting]> = parts.iter().map(|(t, _)| self.index.postings(field, t)).collect();
                    if lists.iter().any(|l| l.is_empty()) { continue; }
                    let idf_sum: f32 = lists.iter().map(|l| idf(n, l.len() as u32)).sum();
                    for (doc_id, freq) in self.phrase_matches(parts, &lists) {
                        *scores.entry(doc_id).or_insert(0.0) += boost * idf_sum * self.tf_part(freq as f32, doc_id, field, avg);
                    }
                }
            }
        }
        scores
    }

    fn tf_part(&self, tf: f32, doc_id: DocId, field: Field, avg: f32) -> f32 {
        let len = self.index.document(doc_id).map(|d| d.field_length(field)).unwrap_or(0);
        tf_norm(tf, len, avg, self.params)
    }

    /// Documents where every phrase term occurs at its offset from the first,
    /// with the number of such occurrences.
    fn phrase_matches(&self, parts: &[(String, u32)], lists: &[&[Posting]]) -> Vec<(DocId, u32)> {
        let mut out = Vec::new();
        let Some((first, rest)) = lists.split_first() else { return out };
        'docs: for head in first.iter() {
            let mut others = Vec::with_capacity(rest.len());
            for (list, (_, off)) in rest.iter().zip(&parts[1..]) {
                match list.binary_search_by_key(&head.doc_id, |p| p.doc_id) {
                    Ok(i) => others.push((&list[i], *off)),
                    Err(_) => continue 'docs,
                }
            }
            let freq = head
                .positions
                .iter()
                .filter(|&&start| others.iter().all(|(p, off)| p.positions.binary_search(&(start + off)).is_ok()))
                .count() as u32;
            if freq > 0 {
                out.push((head.doc_id, freq));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_is_positive_and_decreasing() {
        assert!(idf(10, 10) > 0.0);
        assert!(idf(10, 1) > idf(10, 5));
        assert!(idf(1, 1) > 0.0);
    }

    #[test]
    fn tf_norm_saturates_and_penalizes_length() {
        let p = Bm25Params::default();
        assert!(tf_norm(10.0, 10, 10.0, p) < p.k1 + 1.0);
        assert!(tf_norm(2.0, 10, 10.0, p) > tf_norm(1.0, 10, 10.0, p));
        assert!(tf_norm(1.0, 5, 10.0, p) > tf_norm(1.0, 20, 10.0, p));
    }
}
