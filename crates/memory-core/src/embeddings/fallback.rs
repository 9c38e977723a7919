//! Deterministic fallback embedding (spec §4.1)
//!
//! Produced when the embedding service call fails or the model is
//! unavailable. Built from layered hashes plus lexical features so
//! that similar text still scores similar under cosine distance —
//! not a substitute for the real model, just enough signal to keep
//! retrieval degrading gracefully instead of failing outright.

use crate::config::EMBEDDING_DIMS;

/// Deterministic 768-dim vector for `text`. Same input always produces
/// the same output (spec §8: "`embed(t)` is deterministic for a fixed
/// model and text").
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIMS];

    // Layered hash: blake3 output is 32 bytes; tile it across the
    // vector so every dimension gets hash-derived signal.
    let hash = blake3::hash(text.as_bytes());
    let hash_bytes = hash.as_bytes();
    for (i, slot) in v.iter_mut().enumerate() {
        let byte = hash_bytes[i % hash_bytes.len()];
        *slot = (byte as f32 / 255.0) * 2.0 - 1.0;
    }

    // Lexical features occupy a fixed prefix so two texts sharing
    // coarse shape (length, vocabulary richness) land closer together
    // than two arbitrary hashes would.
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let token_count = tokens.len().max(1) as f32;
    let unique_ratio = {
        let mut uniq: Vec<&str> = tokens.clone();
        uniq.sort_unstable();
        uniq.dedup();
        uniq.len() as f32 / token_count
    };
    let mean_token_len =
        tokens.iter().map(|t| t.chars().count()).sum::<usize>() as f32 / token_count;

    if v.len() > 3 {
        v[0] = (token_count / 100.0).min(1.0);
        v[1] = unique_ratio;
        v[2] = (mean_token_len / 20.0).min(1.0);
        // Positional sinusoid encodes overall text length without
        // dominating the hash-derived dimensions.
        v[3] = (text.len() as f32 * 0.01).sin();
    }

    normalize(&mut v);
    v
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
