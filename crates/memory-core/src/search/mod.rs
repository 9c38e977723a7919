//! Candidate generation, scoring, and fusion (C3 + C6, spec §4.3, §4.6)

mod hybrid;
mod keyword;
mod reranker;
mod scoring;
mod vector_index;

pub use hybrid::{linear_combination, reciprocal_rank_fusion, HybridConfig, HybridFuser};
pub use keyword::keyword_search;
pub use reranker::{rerank, RankedCandidate};
pub use scoring::{answer_boost, composite_score, passes_relevance_gate, temporal_relevance, EmotionalLexicon, ScoringContext, Tone};
pub use vector_index::{AnnConfig, AnnIndex};
