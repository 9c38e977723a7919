//! Data-subject operations: export, delete, anonymize (spec §4.9)

use super::ContentCipher;
use crate::cache::TieredCache;
use crate::clock::Clock;
use crate::error::Result;
use crate::search::AnnIndex;
use crate::storage::Store;
use std::sync::Arc;

/// Bundles the pieces a GDPR request has to touch: durable storage,
/// every in-memory cache tier, and the ANN shard — a delete or
/// anonymize that misses any of these would leave stale data behind
/// (spec §8: "after `delete_user_data(u)` ... in-memory caches contain
/// no u-keyed entries").
pub struct GdprOps {
    store: Arc<Store>,
    cache: Arc<TieredCache>,
    ann_index: Arc<AnnIndex>,
    cipher: Arc<dyn ContentCipher>,
    clock: Arc<dyn Clock>,
}

impl GdprOps {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<TieredCache>,
        ann_index: Arc<AnnIndex>,
        cipher: Arc<dyn ContentCipher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            ann_index,
            cipher,
            clock,
        }
    }

    /// Every record `user_id` owns, with content decrypted, as a
    /// portable JSON document (spec §4.9 "data export").
    pub fn export(&self, user_id: &str) -> Result<serde_json::Value> {
        let memories = self.store.list_for_user(user_id)?;
        let decrypted: Result<Vec<serde_json::Value>> = memories
            .iter()
            .map(|m| {
                let plaintext = self.cipher.decrypt(user_id, m)?;
                let mut value = serde_json::to_value(m).map_err(|e| {
                    crate::error::MemoryError::Internal(format!("serialize memory: {e}"))
                })?;
                value["content"] = serde_json::Value::String(plaintext);
                Ok(value)
            })
            .collect();
        let clusters = self.store.list_clusters_for_user(user_id)?;

        Ok(serde_json::json!({
            "user_id": user_id,
            "memories": decrypted?,
            "clusters": clusters,
        }))
    }

    /// Irreversibly remove every record `user_id` owns, from storage,
    /// every cache tier, and the ANN shard.
    pub fn delete(&self, user_id: &str) -> Result<u64> {
        let now = self.clock.now_secs();
        let deleted = self.store.delete_user_data(user_id, now)?;
        self.cache.evict_user(user_id);
        self.ann_index.delete_shard(user_id);
        Ok(deleted)
    }

    /// Replace `user_id` with an unlinkable pseudonym everywhere in
    /// storage. The ANN shard under the old id is dropped rather than
    /// renamed (it will rebuild lazily on next ingest under the new
    /// id) — acceptable because anonymize is a rare, non-hot-path
    /// operation.
    pub fn anonymize(&self, user_id: &str) -> Result<String> {
        let pseudonym = format!("anon-{}", blake3::hash(user_id.as_bytes()).to_hex());
        let now = self.clock.now_secs();
        self.store.rewrite_user_id(user_id, &pseudonym, now)?;
        self.cache.evict_user(user_id);
        self.ann_index.delete_shard(user_id);
        Ok(pseudonym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::Config;
    use crate::model::{Memory, MemoryType};
    use crate::search::AnnConfig;
    use crate::security::PlaintextCipher;

    fn sample_memory(user_id: &str) -> Memory {
        Memory {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            character_id: None,
            conversation_id: None,
            content: "plain content".into(),
            content_hash: "h1".into(),
            embedding: vec![0.1; crate::config::EMBEDDING_DIMS],
            importance_score: 0.5,
            emotional_weight: 0.0,
            decay_factor: 1.0,
            access_frequency: 0,
            semantic_cluster_id: None,
            memory_type: MemoryType::Fact,
            cross_character_shared: false,
            created_at: 0,
            updated_at: 0,
            last_accessed: 0,
            encryption_metadata: None,
        }
    }

    fn harness() -> (GdprOps, Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("gdpr.db")).unwrap());
        let config = Config::for_tests();
        let cache = Arc::new(TieredCache::new(&config));
        let ann_index = Arc::new(AnnIndex::new(AnnConfig::from(&config)));
        let cipher: Arc<dyn ContentCipher> = Arc::new(PlaintextCipher);
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1000));
        let ops = GdprOps::new(store.clone(), cache, ann_index, cipher, clock);
        (ops, store, dir)
    }

    #[test]
    fn export_includes_decrypted_content() {
        let (ops, store, _dir) = harness();
        store.insert_memory(&sample_memory("u1")).unwrap();

        let export = ops.export("u1").unwrap();
        assert_eq!(export["memories"].as_array().unwrap().len(), 1);
        assert_eq!(export["memories"][0]["content"], "plain content");
    }

    #[test]
    fn delete_removes_everything() {
        let (ops, store, _dir) = harness();
        store.insert_memory(&sample_memory("u1")).unwrap();

        let deleted = ops.delete("u1").unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_for_user("u1").unwrap(), 0);
    }

    #[test]
    fn anonymize_moves_rows_to_pseudonym() {
        let (ops, store, _dir) = harness();
        store.insert_memory(&sample_memory("u1")).unwrap();

        let pseudonym = ops.anonymize("u1").unwrap();
        assert_eq!(store.count_for_user("u1").unwrap(), 0);
        assert_eq!(store.count_for_user(&pseudonym).unwrap(), 1);
    }
}
