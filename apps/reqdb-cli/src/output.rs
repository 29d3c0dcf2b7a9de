//! Terminal and JSON rendering of query results and index status.

use std::fmt::Write as _;

use serde::Serialize;

use reqdb_core::types::{SearchHit, SearchMode};
use reqdb_hybrid::IndexStats;

const SNIPPET_MAX_LEN: usize = 160;

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    mode: SearchMode,
    results: &'a [SearchHit],
}

pub fn format_json(query: &str, mode: SearchMode, hits: &[SearchHit]) -> String {
    serde_json::to_string_pretty(&JsonOutput { query, mode, results: hits }).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_human(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for \"{query}\"");
    }
    let mut out = format!("Found {} result{} for \"{query}\":\n", hits.len(), if hits.len() == 1 { "" } else { "s" });
    for (i, hit) in hits.iter().enumerate() {
        let _ = write!(out, "\n  {}. {}  score={:.4}", i + 1, hit.id, hit.score);
        if let Some(meta) = &hit.metadata {
            if let Some(kind) = &meta.requirement_type {
                let _ = write!(out, "  type={kind}");
            }
            if let Some(c) = &meta.criticality {
                let _ = write!(out, "  criticality={c}");
            }
            let text = if meta.raw_text.is_empty() { &meta.normalized_text } else { &meta.raw_text };
            let _ = write!(out, "\n     {}", truncate(text, SNIPPET_MAX_LEN));
        }
    }
    out
}

pub fn format_stats(stats: &IndexStats) -> String {
    let dimension = stats.dimension.map_or_else(|| "-".to_string(), |d| d.to_string());
    format!(
        "documents (vector):  {}\ndocuments (keyword): {}\ndimension:           {dimension}\nvocabulary:          {}\navg doc length:      {:.2}",
        stats.vector_documents, stats.keyword_documents, stats.vocabulary_size, stats.avg_doc_length
    )
}

fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
