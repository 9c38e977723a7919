//! Embedding client (C1, spec §4.1)

mod client;
mod fallback;

pub use client::{EmbeddingClient, EmbeddingStats};
pub use fallback::fallback_embedding;

use serde::{Deserialize, Serialize};

/// A 768-dimensional embedding vector plus a flag marking whether it
/// came from the real model or the deterministic fallback (spec §4.1:
/// "statistics flag it").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub degraded: bool,
}

/// Cosine similarity between two equal-length vectors. Returns `0.0`
/// for mismatched lengths rather than panicking — candidate generation
/// calls this on caller-controlled data.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Pack a vector into little-endian bytes for blob storage (spec §3:
/// "packed binary, length = 3,072 bytes" for 768 f32s).
pub fn pack_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`pack_vector`]. Returns `None` on malformed input rather
/// than panicking — this decodes untrusted blob storage.
pub fn unpack_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
