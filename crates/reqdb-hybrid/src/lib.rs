//! reqdb-hybrid
//!
//! Hybrid retrieval over requirement records: a BM25 keyword index and a
//! cosine vector index rebuilt together by [`IngestionPipeline`] and queried
//! together by [`HybridRetriever`], which merges the two rankings with
//! Reciprocal Rank Fusion. [`RequirementIndex`] wires both to one pair of
//! indexes and is what applications hold.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use reqdb_core::config::{RetrievalSettings, Settings};
use reqdb_core::error::Result;
use reqdb_core::types::{Requirement, SearchHit, SearchMode};
use reqdb_text::{Bm25Params, KeywordIndex};
use reqdb_vector::VectorIndex;

pub mod fusion;
pub mod pipeline;
pub mod retriever;

pub use fusion::{reciprocal_rank_fusion, rrf_contribution, FusedHit, DEFAULT_RRF_K};
pub use pipeline::{build_searchable_text, IngestReport, IngestionPipeline};
pub use retriever::HybridRetriever;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub keyword_documents: usize,
    pub vector_documents: usize,
    pub dimension: Option<usize>,
    pub vocabulary_size: usize,
    pub avg_doc_length: f64,
}

/// Keyword and vector index over one corpus, with shared ingestion and query paths.
pub struct RequirementIndex {
    text: Arc<KeywordIndex>,
    vector: Arc<VectorIndex>,
    gate: Arc<RwLock<()>>,
    retriever: HybridRetriever<KeywordIndex, VectorIndex>,
    pipeline: IngestionPipeline<KeywordIndex, VectorIndex>,
}

impl RequirementIndex {
    /// Load the snapshots persisted under `dir`; a missing snapshot starts empty.
    pub fn open(dir: impl AsRef<Path>, settings: &Settings) -> Result<Self> {
        let dir = dir.as_ref();
        let text = KeywordIndex::open(dir, Bm25Params::from(settings.bm25))?;
        let vector = VectorIndex::open(dir, settings.embedding.dimension)?;
        info!(
            dir = %dir.display(),
            keyword_docs = text.count(),
            vector_docs = vector.count(),
            "opened requirement index"
        );
        Ok(Self::assemble(text, vector, settings.retrieval.clone()))
    }

    /// An index that never touches disk.
    pub fn in_memory(settings: &Settings) -> Self {
        Self::assemble(
            KeywordIndex::in_memory(Bm25Params::from(settings.bm25)),
            VectorIndex::in_memory(settings.embedding.dimension),
            settings.retrieval.clone(),
        )
    }

    fn assemble(text: KeywordIndex, vector: VectorIndex, retrieval: RetrievalSettings) -> Self {
        let text = Arc::new(text);
        let vector = Arc::new(vector);
        let gate = Arc::new(RwLock::new(()));
        let retriever = HybridRetriever::new(Arc::clone(&text), Arc::clone(&vector), Arc::clone(&gate), retrieval);
        let pipeline = IngestionPipeline::new(Arc::clone(&text), Arc::clone(&vector), Arc::clone(&gate));
        Self { text, vector, gate, retriever, pipeline }
    }

    pub fn ingest(&self, requirements: &[Requirement], embeddings: Vec<Vec<f32>>) -> Result<IngestReport> {
        self.pipeline.ingest(requirements, embeddings)
    }

    pub fn search_hybrid(&self, query_text: &str, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        self.retriever.search_hybrid(query_text, query_embedding, top_k)
    }

    pub fn search_vector_only(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        self.retriever.search_vector_only(query_embedding, top_k, score_threshold)
    }

    pub fn search_keyword_only(&self, query_text: &str, top_k: usize) -> Vec<SearchHit> {
        self.retriever.search_keyword_only(query_text, top_k)
    }

    /// Route a query by `mode`. Vector mode applies the configured similarity
    /// floor; keyword mode ignores `query_embedding`.
    pub fn search(
        &self,
        mode: SearchMode,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        match mode {
            SearchMode::Hybrid => self.search_hybrid(query_text, query_embedding, top_k),
            SearchMode::Vector => {
                self.search_vector_only(query_embedding, top_k, self.retriever.settings().vector_score_floor)
            }
            SearchMode::Keyword => Ok(self.search_keyword_only(query_text, top_k)),
        }
    }

    /// Documents in the vector index, which holds the metadata.
    pub fn count(&self) -> usize {
        let _read = self.gate.read();
        self.vector.count()
    }

    /// Both sides are read under the publish gate, so the numbers always
    /// describe one ingestion.
    pub fn stats(&self) -> IndexStats {
        let _read = self.gate.read();
        IndexStats {
            keyword_documents: self.text.count(),
            vector_documents: self.vector.count(),
            dimension: self.vector.dimension(),
            vocabulary_size: self.text.vocabulary_size(),
            avg_doc_length: self.text.avg_doc_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqdb_core::types::SourceKind;

    fn req(id: &str, text: &str) -> Requirement {
        Requirement { id: id.into(), normalized_text: text.into(), raw_text: text.into(), ..Default::default() }
    }

    #[test]
    fn never_built_index_answers_every_mode_with_nothing() {
        let index = RequirementIndex::in_memory(&Settings::default());
        for mode in [SearchMode::Hybrid, SearchMode::Vector, SearchMode::Keyword] {
            assert!(index.search(mode, "anything", &[1.0, 0.0], 5).expect("search").is_empty());
        }
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn mode_dispatch_labels_sources() {
        let index = RequirementIndex::in_memory(&Settings::default());
        index
            .ingest(&[req("a", "lock idle sessions"), req("b", "purge stale sessions")], vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .expect("ingest");
        let q = [1.0, 0.0];
        assert_eq!(index.search(SearchMode::Vector, "sessions", &q, 5).expect("v")[0].source, SourceKind::Vector);
        assert_eq!(index.search(SearchMode::Keyword, "sessions", &q, 5).expect("k")[0].source, SourceKind::Text);
        assert_eq!(index.search(SearchMode::Hybrid, "sessions", &q, 5).expect("h")[0].source, SourceKind::Hybrid);
    }

    #[test]
    fn stats_reflect_both_indexes() {
        let index = RequirementIndex::in_memory(&Settings::default());
        index.ingest(&[req("a", "lock idle sessions")], vec![vec![0.5, 0.5, 0.0]]).expect("ingest");
        let stats = index.stats();
        assert_eq!((stats.keyword_documents, stats.vector_documents), (1, 1));
        assert_eq!(stats.dimension, Some(3));
        assert_eq!(stats.vocabulary_size, 3);
        // normalized + raw text, both "lock idle sessions"
        assert_eq!(stats.avg_doc_length, 6.0);
    }
}
