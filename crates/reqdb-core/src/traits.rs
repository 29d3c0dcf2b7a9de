use crate::error::Result;
use crate::types::{DocId, DocumentMetadata, SearchHit, VectorEntry};

/// External embedding provider. Failures are opaque to the core.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Keyword engine as seen by the retriever and the ingestion pipeline.
pub trait TextIndexer: Send + Sync {
    type Staged;

    /// Validate, build and write a new snapshot off to the side.
    fn stage(&self, documents: &[(DocId, String)]) -> Result<Self::Staged>;
    /// Make a staged snapshot durable and visible.
    fn publish(&self, staged: Self::Staged) -> Result<()>;
    /// Discard a staged snapshot that will never be published.
    fn discard(&self, staged: Self::Staged);
    /// Put back the snapshot that was live before the last publish.
    fn rollback(&self) -> Result<()>;
    /// Drop what `rollback` would restore; the last publish is final.
    fn forget_previous(&self);

    fn search(&self, query: &str, k: usize) -> Vec<SearchHit>;
    fn count(&self) -> usize;
    fn vocabulary_size(&self) -> usize;

    fn rebuild(&self, documents: &[(DocId, String)]) -> Result<()> {
        let staged = self.stage(documents)?;
        self.publish(staged)
    }
}

/// Vector engine as seen by the retriever and the ingestion pipeline.
pub trait VectorIndexer: Send + Sync {
    type Staged;

    fn stage(&self, entries: Vec<VectorEntry>) -> Result<Self::Staged>;
    fn publish(&self, staged: Self::Staged) -> Result<()>;
    fn discard(&self, staged: Self::Staged);

    fn search_vec(&self, query: &[f32], k: usize, score_threshold: f32) -> Result<Vec<SearchHit>>;
    fn metadata(&self, id: &str) -> Option<DocumentMetadata>;
    fn dimension(&self) -> Option<usize>;
    fn count(&self) -> usize;

    fn replace_all(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let staged = self.stage(entries)?;
        self.publish(staged)
    }
}
