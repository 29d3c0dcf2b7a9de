//! Reciprocal Rank Fusion.
//!
//! Fuses on list position only, so cosine similarities and BM25 scores can be
//! combined without calibrating one against the other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use reqdb_core::types::{DocId, DocumentMetadata, SearchHit, SourceKind};

/// Smoothing constant used when none is configured.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Contribution of an item at 0-based `rank`: `1 / (k + rank + 1)`.
pub fn rrf_contribution(k: f32, rank: usize) -> f32 {
    1.0 / (k + rank as f32 + 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: DocId,
    pub score: f32,
    /// 0-based rank in each input list, `None` where the id is absent.
    pub ranks: Vec<Option<usize>>,
    pub metadata: Option<DocumentMetadata>,
}

impl FusedHit {
    fn best_rank(&self) -> usize {
        self.ranks.iter().flatten().copied().min().unwrap_or(usize::MAX)
    }

    pub fn into_hit(self) -> SearchHit {
        SearchHit { id: self.id, score: self.score, source: SourceKind::Hybrid, metadata: self.metadata }
    }
}

/// Sum RRF contributions per id across `lists` and return them best first.
///
/// Metadata is taken from the earliest list that carries it for the id, so
/// callers put the richer source first. Tie order is fixed, whatever order
/// the lists come in: equal scores go to the better single-list rank, then
/// to the smaller id. A repeated id within one list only counts at its first
/// position.
pub fn reciprocal_rank_fusion(lists: &[&[SearchHit]], k: f32) -> Vec<FusedHit> {
    let mut fused: HashMap<&str, FusedHit> = HashMap::new();

    for (list_no, hits) in lists.iter().enumerate() {
        for (rank, hit) in hits.iter().enumerate() {
            match fused.entry(hit.id.as_str()) {
                Entry::Occupied(mut e) => {
                    let f = e.get_mut();
                    if f.ranks[list_no].is_some() {
                        continue;
                    }
                    f.ranks[list_no] = Some(rank);
                    f.score += rrf_contribution(k, rank);
                    if f.metadata.is_none() {
                        f.metadata.clone_from(&hit.metadata);
                    }
                }
                Entry::Vacant(e) => {
                    let mut ranks = vec![None; lists.len()];
                    ranks[list_no] = Some(rank);
                    e.insert(FusedHit {
                        id: hit.id.clone(),
                        score: rrf_contribution(k, rank),
                        ranks,
                        metadata: hit.metadata.clone(),
                    });
                }
            }
        }
    }

    let mut out: Vec<FusedHit> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list(ids: &[&str], source: SourceKind) -> Vec<SearchHit> {
        ids.iter().enumerate().map(|(i, id)| SearchHit::new(*id, 1.0 / (i as f32 + 1.0), source)).collect()
    }

    #[test]
    fn overlapping_ids_rank_first() {
        let dense = list(&["c1", "c2", "c3"], SourceKind::Vector);
        let sparse = list(&["c2", "c1", "c4"], SourceKind::Text);
        let fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], DEFAULT_RRF_K);
        let top: Vec<&str> = fused.iter().take(2).map(|f| f.id.as_str()).collect();
        assert!(top.contains(&"c1") && top.contains(&"c2"));
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn single_list_ids_get_one_term() {
        let dense = list(&["a", "b"], SourceKind::Vector);
        let sparse = list(&["c"], SourceKind::Text);
        let fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], 60.0);
        let b = fused.iter().find(|f| f.id == "b").expect("b");
        assert_eq!(b.score, 1.0 / 62.0);
        assert_eq!(b.ranks, vec![Some(1), None]);
    }

    #[test]
    fn ties_prefer_better_single_rank() {
        // z sits at ranks (0, 1), w at (1, 0): identical sums and best ranks.
        let dense = list(&["z", "w"], SourceKind::Vector);
        let sparse = list(&["w", "z"], SourceKind::Text);
        let fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], 60.0);
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(fused[0].id, "w", "equal best rank falls back to id order");
    }

    #[test]
    fn tie_order_ignores_list_order() {
        let dense = list(&["z", "w", "v"], SourceKind::Vector);
        let sparse = list(&["w", "z", "u"], SourceKind::Text);
        let ids = |fused: Vec<FusedHit>| fused.into_iter().map(|f| f.id).collect::<Vec<_>>();
        let forward = ids(reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], 60.0));
        let backward = ids(reciprocal_rank_fusion(&[sparse.as_slice(), dense.as_slice()], 60.0));
        assert_eq!(forward, vec!["w", "z", "u", "v"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn metadata_prefers_earlier_list() {
        let mut dense = list(&["a"], SourceKind::Vector);
        dense[0].metadata = Some(DocumentMetadata { id: "a".into(), raw_text: "from vector".into(), ..Default::default() });
        let mut sparse = list(&["a", "b"], SourceKind::Text);
        sparse[0].metadata = Some(DocumentMetadata { id: "a".into(), raw_text: "from text".into(), ..Default::default() });
        let fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], 60.0);
        let a = fused.iter().find(|f| f.id == "a").expect("a");
        assert_eq!(a.metadata.as_ref().map(|m| m.raw_text.as_str()), Some("from vector"));
        assert!(fused.iter().find(|f| f.id == "b").expect("b").metadata.is_none());
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        let none: Vec<SearchHit> = Vec::new();
        assert!(reciprocal_rank_fusion(&[none.as_slice(), none.as_slice()], 60.0).is_empty());
    }

    proptest! {
        #[test]
        fn fused_score_is_sum_of_reciprocal_ranks(r1 in 0usize..40, r2 in 0usize..40) {
            let dense: Vec<SearchHit> = (0..40)
                .map(|i| SearchHit::new(if i == r1 { "t".to_string() } else { format!("v{i}") }, 0.0, SourceKind::Vector))
                .collect();
            let sparse: Vec<SearchHit> = (0..40)
                .map(|i| SearchHit::new(if i == r2 { "t".to_string() } else { format!("k{i}") }, 0.0, SourceKind::Text))
                .collect();
            let fused = reciprocal_rank_fusion(&[dense.as_slice(), sparse.as_slice()], 60.0);
            let t = fused.iter().find(|f| f.id == "t").expect("t");
            let expected = 1.0 / (60.0 + r1 as f32 + 1.0) + 1.0 / (60.0 + r2 as f32 + 1.0);
            prop_assert!((t.score - expected).abs() < 1e-7);
        }
    }
}
