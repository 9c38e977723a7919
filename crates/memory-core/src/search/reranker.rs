//! Diversity-penalized re-ranking (spec §4.6.7)
//!
//! Greedy maximal-marginal-relevance-style selection: repeatedly take
//! the highest remaining score, then penalize everything still
//! pending that looks like a near-duplicate of what was just picked.

use crate::embeddings::cosine_similarity;

/// One candidate entering the re-rank step.
pub struct RankedCandidate {
    pub id: String,
    pub score: f32,
    pub embedding: Vec<f32>,
}

/// Re-rank `candidates` (already sorted or not) down to `final_k`,
/// penalizing near-duplicates of already-selected items by
/// `diversity_penalty` times their similarity to the pick (spec
/// §4.6.7 default penalty 0.1).
pub fn rerank(mut candidates: Vec<RankedCandidate>, final_k: usize, diversity_penalty: f32) -> Vec<RankedCandidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<RankedCandidate> = Vec::with_capacity(final_k.min(candidates.len()));
    let mut remaining = candidates;

    while selected.len() < final_k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_adjusted = f32::MIN;
        for (idx, candidate) in remaining.iter().enumerate() {
            let max_sim_to_selected = selected
                .iter()
                .map(|s| cosine_similarity(&s.embedding, &candidate.embedding))
                .fold(0.0f32, f32::max);
            let adjusted = candidate.score - diversity_penalty * max_sim_to_selected;
            if adjusted > best_adjusted {
                best_adjusted = adjusted;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected
}
