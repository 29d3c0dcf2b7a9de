//! reqdb-text
//!
//! In-process BM25 keyword engine: tokenizer, inverted index with JSON
//! snapshots, and Okapi BM25 scoring. See `index` and `search` modules.

pub mod tokenizer;
pub mod index;
pub mod search;

pub use index::{KeywordIndex, KeywordSnapshot, StagedKeywordIndex, KEYWORD_INDEX_FILE};
pub use search::{bm25_search, idf, term_weight, Bm25Params};
pub use tokenizer::tokenize;
