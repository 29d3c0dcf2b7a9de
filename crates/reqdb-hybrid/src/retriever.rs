use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use reqdb_core::config::RetrievalSettings;
use reqdb_core::error::Result;
use reqdb_core::traits::{TextIndexer, VectorIndexer};
use reqdb_core::types::SearchHit;

use crate::fusion::reciprocal_rank_fusion;

/// Query side of the hybrid index: runs both engines and fuses their rankings.
///
/// Shares the publish gate with the ingestion pipeline. Hybrid searches read
/// both indexes under the shared side of the gate, so they never pair a
/// keyword snapshot from one ingestion with a vector snapshot from another.
pub struct HybridRetriever<TI, VI>
where
    TI: TextIndexer,
    VI: VectorIndexer,
{
    text: Arc<TI>,
    vector: Arc<VI>,
    gate: Arc<RwLock<()>>,
    settings: RetrievalSettings,
}

impl<TI, VI> HybridRetriever<TI, VI>
where
    TI: TextIndexer,
    VI: VectorIndexer,
{
    pub fn new(text: Arc<TI>, vector: Arc<VI>, gate: Arc<RwLock<()>>, settings: RetrievalSettings) -> Self {
        Self { text, vector, gate, settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Fused ranking over both engines, best first, at most `top_k` hits.
    ///
    /// Each engine contributes `top_k * candidate_multiplier` candidates; the
    /// vector leg drops anything under `vector_score_floor`. Keyword-only hits
    /// get their metadata from the vector snapshot.
    pub fn search_hybrid(&self, query_text: &str, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let candidates = top_k.saturating_mul(self.settings.candidate_multiplier.max(1));

        let _read = self.gate.read();
        let dense = self.vector.search_vec(query_embedding, candidates, self.settings.vector_score_floor)?;
        let sparse = self.text.search(query_text, candidates);

        let mut fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], self.settings.rrf_k);
        fused.truncate(top_k);

        let hits: Vec<SearchHit> = fused
            .into_iter()
            .map(|f| {
                let mut hit = f.into_hit();
                if hit.metadata.is_none() {
                    hit.metadata = self.vector.metadata(&hit.id);
                }
                hit
            })
            .collect();
        debug!(query = query_text, dense = dense.len(), sparse = sparse.len(), hits = hits.len(), "hybrid search");
        Ok(hits)
    }

    /// Cosine ranking only, with a caller-supplied similarity floor.
    pub fn search_vector_only(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        self.vector.search_vec(query_embedding, top_k, score_threshold)
    }

    /// BM25 ranking only, decorated with metadata where the vector snapshot has it.
    pub fn search_keyword_only(&self, query_text: &str, top_k: usize) -> Vec<SearchHit> {
        let _read = self.gate.read();
        let mut hits = self.text.search(query_text, top_k);
        for hit in &mut hits {
            hit.metadata = self.vector.metadata(&hit.id);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqdb_core::types::{DocId, DocumentMetadata, SourceKind, VectorEntry};
    use reqdb_text::{Bm25Params, KeywordIndex};
    use reqdb_vector::VectorIndex;

    fn entry(id: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: id.to_string(),
            embedding,
            metadata: DocumentMetadata { id: id.to_string(), raw_text: format!("raw {id}"), ..Default::default() },
        }
    }

    fn retriever() -> HybridRetriever<KeywordIndex, VectorIndex> {
        let text = Arc::new(KeywordIndex::in_memory(Bm25Params::default()));
        let vector = Arc::new(VectorIndex::in_memory(None));
        let docs: Vec<(DocId, String)> = vec![
            ("r1".into(), "encrypt stored card data".into()),
            ("r2".into(), "render the dashboard".into()),
            ("r3".into(), "rotate encryption keys yearly".into()),
        ];
        text.rebuild(&docs).expect("text");
        vector
            .replace_all(vec![
                entry("r1", vec![1.0, 0.0, 0.0]),
                entry("r2", vec![0.0, 1.0, 0.0]),
                entry("r3", vec![0.7, 0.0, 0.7]),
            ])
            .expect("vector");
        HybridRetriever::new(text, vector, Arc::new(RwLock::new(())), RetrievalSettings::default())
    }

    #[test]
    fn zero_top_k_returns_nothing() {
        let r = retriever();
        assert!(r.search_hybrid("card", &[1.0, 0.0, 0.0], 0).expect("search").is_empty());
    }

    #[test]
    fn hits_found_by_both_engines_rank_first() {
        let r = retriever();
        let hits = r.search_hybrid("card data", &[1.0, 0.0, 0.1], 3).expect("search");
        assert_eq!(hits[0].id, "r1");
        assert_eq!(hits[0].source, SourceKind::Hybrid);
        assert!((hits[0].score - 2.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn vector_floor_drops_weak_candidates() {
        let r = retriever();
        // r2 is orthogonal to the query and shares no terms with it.
        let hits = r.search_hybrid("encryption", &[1.0, 0.0, 0.0], 5).expect("search");
        assert!(hits.iter().all(|h| h.id != "r2"));
    }

    #[test]
    fn keyword_only_hits_are_decorated() {
        let r = retriever();
        let hits = r.search_keyword_only("dashboard", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, SourceKind::Text);
        assert_eq!(hits[0].metadata.as_ref().map(|m| m.raw_text.as_str()), Some("raw r2"));
    }

    #[test]
    fn vector_only_passes_threshold_through() {
        let r = retriever();
        let hits = r.search_vector_only(&[1.0, 0.0, 0.0], 5, 0.9).expect("search");
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["r1"]);
    }
}
