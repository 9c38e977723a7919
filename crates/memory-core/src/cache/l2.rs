//! L2 semantic-similarity cache (spec §4.2)
//!
//! Key: hash of a reduced canonical form of the query (so near-duplicate
//! phrasing lands in the same bucket). Value: the `(query_vector,
//! top-K results)` pairs seen for that bucket. A lookup is a hit when
//! the incoming query vector has cosine similarity ≥
//! `semantic_threshold` against a stored vector in the same bucket.

use super::CacheStats;
use crate::embeddings::cosine_similarity;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// How many entries are kept per canonical bucket before the oldest is
/// dropped. Buckets rarely need more than a handful of distinct
/// phrasings to be useful.
const ENTRIES_PER_BUCKET: usize = 4;

struct Entry {
    user_id: String,
    query_vector: Vec<f32>,
    results: serde_json::Value,
}

fn canonical_form(text: &str) -> String {
    let mut words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .take(8)
        .collect();
    words.sort();
    words.join(" ")
}

fn bucket_key(user_id: &str, text: &str) -> String {
    blake3::hash(format!("{user_id}\0{}", canonical_form(text)).as_bytes())
        .to_hex()
        .to_string()
}

pub struct SemanticCache {
    buckets: Mutex<lru::LruCache<String, Vec<Entry>>>,
    threshold: f32,
    stats: Mutex<CacheStats>,
}

impl SemanticCache {
    pub fn new(capacity: usize, threshold: f32) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            buckets: Mutex::new(lru::LruCache::new(cap)),
            threshold,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(&self, user_id: &str, text: &str, query_vector: &[f32]) -> Option<serde_json::Value> {
        let key = bucket_key(user_id, text);
        let mut buckets = self.buckets.lock();
        let hit = buckets.get(&key).and_then(|entries| {
            entries
                .iter()
                .filter(|e| e.user_id == user_id)
                .find(|e| cosine_similarity(&e.query_vector, query_vector) >= self.threshold)
                .map(|e| e.results.clone())
        });
        drop(buckets);

        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        hit
    }

    pub fn put(&self, user_id: &str, text: &str, query_vector: Vec<f32>, results: serde_json::Value) {
        let key = bucket_key(user_id, text);
        let mut buckets = self.buckets.lock();
        let entries = buckets.get_or_insert_mut(key, Vec::new);
        entries.push(Entry {
            user_id: user_id.to_string(),
            query_vector,
            results,
        });
        if entries.len() > ENTRIES_PER_BUCKET {
            entries.remove(0);
        }
    }

    /// Remove every entry owned by `user_id`, across all buckets.
    pub fn evict_user(&self, user_id: &str) {
        let mut buckets = self.buckets.lock();
        let keys: Vec<String> = buckets.iter().map(|(k, _)| k.clone()).collect();
        for key in keys {
            if let Some(entries) = buckets.peek_mut(&key) {
                entries.retain(|e| e.user_id != user_id);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}
