use reqdb_core::error::{Error, Result};
use reqdb_core::types::{DocId, DocumentMetadata};

use crate::index::VectorSnapshot;

/// Vectors whose magnitude is below this are left as they are.
pub const NORM_EPSILON: f64 = 1e-10;

/// Scale `v` to unit length in place. Returns the original magnitude.
pub fn l2_normalize(v: &mut [f32]) -> f64 {
    let magnitude = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if magnitude >= NORM_EPSILON {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / magnitude) as f32;
        }
    }
    magnitude
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine computed directly from the raw vectors; 0 if either is ~zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = a.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if na < NORM_EPSILON || nb < NORM_EPSILON {
        return 0.0;
    }
    let d: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    (d / (na * nb)) as f32
}

impl VectorSnapshot {
    /// Exact top-`k` by cosine similarity with `score >= threshold`.
    ///
    /// Ties keep insertion order. An empty snapshot has no hits regardless of
    /// the query's shape.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(DocId, f32, DocumentMetadata)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
                context: "query embedding".to_string(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .rows()
            .enumerate()
            .map(|(i, row)| (i, dot(&q, row)))
            .filter(|(_, s)| *s >= threshold)
            .collect();
        // `sort_by` is stable, so equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, s)| (self.ids()[i].clone(), s, self.metadata_at(i).clone()))
            .collect())
    }
}
