//! Hybrid fusion: semantic + keyword (spec §4.6.8)
//!
//! Reciprocal Rank Fusion combines the ANN/linear-scan candidate
//! ranking with an FTS5 keyword ranking. RRF is used because it needs
//! no score normalization across the two very different scales
//! (cosine similarity vs. BM25).

use std::collections::HashMap;

/// `score(d) = sum of 1/(k + rank(d))` across both ranked lists
/// (spec §4.6.8, default `k_RRF = 60`).
pub fn reciprocal_rank_fusion(
    semantic_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    k: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (rank, (id, _)) in semantic_results.iter().enumerate() {
        *scores.entry(id.clone()).or_default() += 1.0 / (k + rank as f32);
    }
    for (rank, (id, _)) in keyword_results.iter().enumerate() {
        *scores.entry(id.clone()).or_default() += 1.0 / (k + rank as f32);
    }

    let mut results: Vec<(String, f32)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Weighted sum of min-max-normalized scores, `semantic=0.7`,
/// `keyword=0.3` by default (spec §4.6.8). Not wired into the
/// retrieval pipeline by default — RRF is — but exposed as an
/// alternative fusion strategy for callers that want one.
pub fn linear_combination(
    semantic_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    semantic_weight: f32,
    keyword_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    let max_semantic = semantic_results.first().map(|(_, s)| *s).unwrap_or(1.0).max(0.001);
    for (id, score) in semantic_results {
        *scores.entry(id.clone()).or_default() += (score / max_semantic) * semantic_weight;
    }

    let max_keyword = keyword_results.first().map(|(_, s)| *s).unwrap_or(1.0).max(0.001);
    for (id, score) in keyword_results {
        *scores.entry(id.clone()).or_default() += (score / max_keyword) * keyword_weight;
    }

    let mut results: Vec<(String, f32)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Bundles fusion config so the retrieval pipeline doesn't thread four
/// loose floats through every call.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub rrf_k: f32,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
}

impl From<&crate::config::Config> for HybridConfig {
    fn from(c: &crate::config::Config) -> Self {
        Self {
            rrf_k: c.rrf_k,
            semantic_weight: c.semantic_weight,
            keyword_weight: c.keyword_weight,
        }
    }
}

pub struct HybridFuser {
    config: HybridConfig,
}

impl HybridFuser {
    pub fn new(config: HybridConfig) -> Self {
        Self { config }
    }

    pub fn fuse(&self, semantic: &[(String, f32)], keyword: &[(String, f32)]) -> Vec<(String, f32)> {
        reciprocal_rank_fusion(semantic, keyword, self.config.rrf_k)
    }

    pub fn fuse_linear(&self, semantic: &[(String, f32)], keyword: &[(String, f32)]) -> Vec<(String, f32)> {
        linear_combination(
            semantic,
            keyword,
            self.config.semantic_weight,
            self.config.keyword_weight,
        )
    }
}
