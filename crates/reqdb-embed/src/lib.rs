//! reqdb-embed
//!
//! Adapters around the external embedding provider. The core never calls a
//! model itself: callers embed up front with [`embed_lenient`] and hand the
//! vectors to ingestion. [`HashingEmbedder`] is a deterministic offline
//! provider for development and tests.

use std::hash::{Hash, Hasher};

use anyhow::Result;
use twox_hash::XxHash64;

use reqdb_core::config::EmbeddingSettings;
use reqdb_core::traits::Embedder;

mod batch;

pub use batch::{embed_lenient, EmbedOutcome};

/// Dimension used by the production embedding model.
pub const DEFAULT_DIMENSION: usize = 3072;

/// Signed feature hashing of lowercased alphanumeric terms, L2-normalized.
///
/// Texts sharing terms get positive cosine similarity, disjoint texts land
/// near zero (up to hash collisions).
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| t.len() > 1) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 1 { -1.0 } else { 1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Provider selected by configuration. Only the offline hashing provider is
/// built in; remote providers implement [`Embedder`] outside this crate.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Box<dyn Embedder> {
    let dim = settings.dimension.unwrap_or(DEFAULT_DIMENSION);
    tracing::info!(dim, "using hashing embedder");
    Box::new(HashingEmbedder::new(dim))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cos(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn shapes_and_determinism() {
        let embedder = HashingEmbedder::new(256);
        let texts = vec!["payment security".to_string(), "payment security".to_string()];
        let embs = embedder.embed_batch(&texts).expect("embed_batch");
        assert_eq!(embs[0].len(), 256);
        let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-5, "vector is L2-normalized (norm={norm})");
        assert_eq!(embs[0], embs[1]);
    }

    #[test]
    fn shared_terms_score_higher_than_disjoint() {
        let e = HashingEmbedder::new(1024);
        let q = e.embed_text("payment security");
        let both = e.embed_text("Payment data security controls");
        let neither = e.embed_text("dashboard renders quickly");
        assert!(cos(&q, &both) > cos(&q, &neither));
    }

    #[test]
    fn empty_text_is_a_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert_eq!(e.embed_text("  "), vec![0.0; 8]);
    }

    #[test]
    fn default_embedder_honours_configured_dimension() {
        let settings = EmbeddingSettings { dimension: Some(64), ..EmbeddingSettings::default() };
        assert_eq!(get_default_embedder(&settings).dim(), 64);
        assert_eq!(get_default_embedder(&EmbeddingSettings::default()).dim(), DEFAULT_DIMENSION);
    }
}
