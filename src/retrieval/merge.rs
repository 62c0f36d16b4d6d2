// file: src/retrieval/merge.rs
// description: union of dense and sparse hits, deduplicated by id keeping the higher score
// reference: dedup-by-id merge ahead of reranking

use crate::error::IndexKind;
use crate::models::{MergedHit, SearchHit};
use std::collections::HashMap;

/// Merged hits sorted by score descending, ties broken by id.
///
/// Native scores of the two indexes are not comparable; this order is
/// provisional until the reranker runs.
pub fn merge_and_deduplicate(dense: Vec<SearchHit>, sparse: Vec<SearchHit>) -> Vec<MergedHit> {
    let mut merged: HashMap<String, MergedHit> = HashMap::with_capacity(dense.len() + sparse.len());

    for hit in dense.into_iter().chain(sparse) {
        match merged.get_mut(&hit.id) {
            Some(existing) => absorb(existing, hit),
            None => {
                merged.insert(hit.id.clone(), MergedHit::from_hit(hit));
            }
        }
    }

    let mut hits: Vec<MergedHit> = merged.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits
}

fn absorb(existing: &mut MergedHit, hit: SearchHit) {
    let slot = match hit.index {
        IndexKind::Dense => &mut existing.dense_score,
        IndexKind::Sparse => &mut existing.sparse_score,
    };
    *slot = Some(slot.map_or(hit.score, |s| s.max(hit.score)));

    if hit.score > existing.score {
        existing.score = hit.score;
        existing.text = hit.text;
        existing.fields = hit.fields;
    }
}
