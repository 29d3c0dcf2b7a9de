//! Okapi BM25 scoring over a [`KeywordSnapshot`].

use std::collections::{HashMap, HashSet};

use reqdb_core::config::Bm25Settings;
use reqdb_core::types::DocId;

use crate::index::KeywordSnapshot;
use crate::tokenizer::tokenize;

/// Term-frequency saturation (`k1`) and length normalization (`b`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl From<Bm25Settings> for Bm25Params {
    fn from(s: Bm25Settings) -> Self {
        Self { k1: f64::from(s.k1), b: f64::from(s.b) }
    }
}

/// `ln((N - n_t + 0.5) / (n_t + 0.5) + 1)`; never negative.
pub fn idf(total_docs: usize, docs_with_term: usize) -> f64 {
    let n = total_docs as f64;
    let n_t = docs_with_term as f64;
    ((n - n_t + 0.5) / (n_t + 0.5) + 1.0).ln()
}

/// Saturated, length-normalized contribution of one term to one document,
/// before the idf factor. Callers guarantee `avg_doc_length > 0`.
pub fn term_weight(tf: f64, doc_length: f64, avg_doc_length: f64, params: Bm25Params) -> f64 {
    let norm = 1.0 - params.b + params.b * doc_length / avg_doc_length;
    (tf * (params.k1 + 1.0)) / (tf + params.k1 * norm)
}

/// Score every document sharing at least one query term and return the top
/// `k` as `(id, score)` by descending score, ties by ascending id.
///
/// Documents whose score is exactly zero are left out. A snapshot whose
/// average document length is zero has nothing to score and yields no hits.
pub fn bm25_search(snapshot: &KeywordSnapshot, params: Bm25Params, query: &str, k: usize) -> Vec<(DocId, f32)> {
    if k == 0 || snapshot.total_docs == 0 || snapshot.avg_doc_length <= 0.0 {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let terms: Vec<String> = tokenize(query).into_iter().filter(|t| seen.insert(t.clone())).collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scores: HashMap<&str, f64> = HashMap::new();
    for term in &terms {
        let Some(postings) = snapshot.inverted_index.get(term) else { continue };
        let term_idf = idf(snapshot.total_docs, postings.len());
        for (doc_id, &tf) in postings {
            let doc_len = snapshot.doc_lengths.get(doc_id).copied().unwrap_or(0);
            let w = term_idf * term_weight(f64::from(tf), f64::from(doc_len), snapshot.avg_doc_length, params);
            *scores.entry(doc_id.as_str()).or_insert(0.0) += w;
        }
    }

    let mut ranked: Vec<(DocId, f32)> = scores
        .into_iter()
        .filter(|(_, s)| *s > 0.0)
        .map(|(id, s)| (id.to_string(), s as f32))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
