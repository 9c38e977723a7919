//! Tiered cache (C2, spec §4.2)
//!
//! Three independently bounded LRU caches sitting in front of the
//! embedding client and the retrieval pipeline. Each is guarded by its
//! own lock (spec §5: "in-memory LRU caches are protected by single
//! locks per cache; hot-path lookups release the lock before invoking
//! downstream work").

mod l1;
mod l2;
mod l3;

pub use l1::ExactEmbeddingCache;
pub use l2::SemanticCache;
pub use l3::ResultCache;

/// Hit/miss counters shared by all three tiers.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// The tiered cache, bundling all three levels behind one handle
/// (spec §9: "an explicit cache handle injected into components").
pub struct TieredCache {
    pub l1: ExactEmbeddingCache,
    pub l2: SemanticCache,
    pub l3: ResultCache,
}

impl TieredCache {
    pub fn new(config: &crate::config::Config) -> Self {
        Self {
            l1: ExactEmbeddingCache::new(config.cache_l1_size),
            l2: SemanticCache::new(config.cache_l2_size, config.semantic_cache_threshold),
            l3: ResultCache::new(config.cache_l3_size, config.cache_l3_ttl_ms),
        }
    }

    /// Evict every entry belonging to `user_id` across all tiers
    /// (spec §8: "after `delete_user_data(u)` ... in-memory caches
    /// contain no u-keyed entries").
    pub fn evict_user(&self, user_id: &str) {
        self.l2.evict_user(user_id);
        self.l3.evict_user(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_stats_hit_rate() {
        let mut s = CacheStats::default();
        s.record_hit();
        s.record_hit();
        s.record_miss();
        assert!((s.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_hit_rate_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
