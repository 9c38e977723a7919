//! L3 TTL'd result cache (spec §4.2)
//!
//! Key: `(user_id, query_hash, limit)`. Value: a serialized result
//! page that expires after `cache_l3_ttl_ms` regardless of LRU
//! pressure.

use super::CacheStats;
use crate::clock::Clock;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct Entry {
    user_id: String,
    value: serde_json::Value,
    expires_at_ms: i64,
}

fn key_for(user_id: &str, query_hash: &str, limit: usize, character_id: Option<&str>) -> String {
    format!("{user_id}\0{query_hash}\0{limit}\0{}", character_id.unwrap_or(""))
}

pub struct ResultCache {
    inner: Mutex<lru::LruCache<String, Entry>>,
    ttl_ms: i64,
    stats: Mutex<CacheStats>,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(lru::LruCache::new(cap)),
            ttl_ms: ttl_ms as i64,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(
        &self,
        clock: &Arc<dyn Clock>,
        user_id: &str,
        query_hash: &str,
        limit: usize,
        character_id: Option<&str>,
    ) -> Option<serde_json::Value> {
        let key = key_for(user_id, query_hash, limit, character_id);
        let now_ms = clock.now_millis();
        let mut cache = self.inner.lock();

        let hit = match cache.get(&key) {
            Some(entry) if entry.expires_at_ms > now_ms => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        };
        drop(cache);

        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        hit
    }

    pub fn put(
        &self,
        clock: &Arc<dyn Clock>,
        user_id: &str,
        query_hash: &str,
        limit: usize,
        character_id: Option<&str>,
        value: serde_json::Value,
    ) {
        let key = key_for(user_id, query_hash, limit, character_id);
        self.inner.lock().put(
            key,
            Entry {
                user_id: user_id.to_string(),
                value,
                expires_at_ms: clock.now_millis() + self.ttl_ms,
            },
        );
    }

    /// Conservative invalidation: drop every cached page for
    /// `user_id` (spec §4.7: "invalidate on any insert").
    pub fn evict_user(&self, user_id: &str) {
        let mut cache = self.inner.lock();
        let keys: Vec<String> = cache
            .iter()
            .filter(|(_, e)| e.user_id == user_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            cache.pop(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}
