//! L1 exact embedding cache (spec §4.2)
//!
//! Key: `hash(text, model)`. Value: the 768-dim vector. A hit skips
//! the embedding service entirely.

use super::CacheStats;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

fn key_for(text: &str, model: &str) -> String {
    blake3::hash(format!("{model}\0{text}").as_bytes()).to_hex().to_string()
}

pub struct ExactEmbeddingCache {
    inner: Mutex<lru::LruCache<String, Vec<f32>>>,
    stats: Mutex<CacheStats>,
}

impl ExactEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(lru::LruCache::new(cap)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let key = key_for(text, model);
        let mut cache = self.inner.lock();
        let hit = cache.get(&key).cloned();
        drop(cache);
        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        hit
    }

    pub fn put(&self, text: &str, model: &str, vector: Vec<f32>) {
        let key = key_for(text, model);
        self.inner.lock().put(key, vector);
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
