use tracing::warn;

use reqdb_core::traits::Embedder;

/// Embeddings aligned 1:1 with the input texts.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedOutcome {
    pub embeddings: Vec<Vec<f32>>,
    /// Items replaced by a zero vector because the provider failed them.
    pub degraded: usize,
}

/// Embed `texts` in batches of `batch_size`.
///
/// A failed batch, a batch of the wrong length, or an individual vector of
/// the wrong dimension degrades to zero vectors of `embedder.dim()` for the
/// affected items. The call itself never fails. `on_batch` receives the
/// number of items finished after every batch.
pub fn embed_lenient(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> EmbedOutcome {
    let dim = embedder.dim();
    let mut embeddings = Vec::with_capacity(texts.len());
    let mut degraded = 0usize;

    for (batch_no, chunk) in texts.chunks(batch_size.max(1)).enumerate() {
        match embedder.embed_batch(chunk) {
            Ok(vectors) if vectors.len() == chunk.len() => {
                for (i, v) in vectors.into_iter().enumerate() {
                    if v.len() == dim {
                        embeddings.push(v);
                    } else {
                        warn!(batch = batch_no, item = i, expected = dim, actual = v.len(), "embedding has wrong dimension, using zero vector");
                        embeddings.push(vec![0.0; dim]);
                        degraded += 1;
                    }
                }
            }
            Ok(vectors) => {
                warn!(batch = batch_no, expected = chunk.len(), actual = vectors.len(), "provider returned a short batch, using zero vectors");
                embeddings.extend(std::iter::repeat_with(|| vec![0.0; dim]).take(chunk.len()));
                degraded += chunk.len();
            }
            Err(e) => {
                warn!(batch = batch_no, "embedding batch failed, using zero vectors: {e:#}");
                embeddings.extend(std::iter::repeat_with(|| vec![0.0; dim]).take(chunk.len()));
                degraded += chunk.len();
            }
        }
        on_batch(chunk.len());
    }

    EmbedOutcome { embeddings, degraded }
}
