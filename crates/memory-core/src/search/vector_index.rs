//! Per-user-partitioned ANN index (C3, spec §4.3)
//!
//! Each `user_id` gets its own HNSW graph so a query can never surface
//! another user's vectors even if the index layer itself had a bug —
//! isolation is structural, not just a filter condition. With the
//! `vector-search` feature disabled, [`AnnIndex`] reports every corpus
//! as unavailable and callers fall back to a linear scan over storage
//! (spec §4.6.3, §9's HNSW open question).

use dashmap::DashMap;

#[cfg(feature = "vector-search")]
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Index configuration (spec §4.3 defaults).
#[derive(Debug, Clone)]
pub struct AnnConfig {
    pub dimensions: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl From<&crate::config::Config> for AnnConfig {
    fn from(c: &crate::config::Config) -> Self {
        Self {
            dimensions: crate::config::EMBEDDING_DIMS,
            m: c.hnsw_m,
            ef_construction: c.hnsw_ef_construction,
            ef_search: c.hnsw_ef_search,
        }
    }
}

#[cfg(feature = "vector-search")]
struct UserShard {
    index: Index,
    key_to_id: std::collections::HashMap<String, u64>,
    id_to_key: std::collections::HashMap<u64, String>,
    next_id: u64,
}

#[cfg(feature = "vector-search")]
impl UserShard {
    fn new(config: &AnnConfig) -> crate::error::Result<Self> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.m,
            expansion_add: config.ef_construction,
            expansion_search: config.ef_search,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| crate::error::MemoryError::Internal(format!("ann index init: {e}")))?;
        index
            .reserve(16)
            .map_err(|e| crate::error::MemoryError::Internal(format!("ann reserve: {e}")))?;
        Ok(Self {
            index,
            key_to_id: std::collections::HashMap::new(),
            id_to_key: std::collections::HashMap::new(),
            next_id: 0,
        })
    }

    fn insert(&mut self, memory_id: &str, vector: &[f32]) -> crate::error::Result<()> {
        if let Some(&id) = self.key_to_id.get(memory_id) {
            let _ = self.index.remove(id);
            self.index
                .add(id, vector)
                .map_err(|e| crate::error::MemoryError::Internal(format!("ann add: {e}")))?;
            return Ok(());
        }

        if self.index.size() >= self.index.capacity() {
            let new_cap = std::cmp::max(self.index.capacity() * 2, 16);
            self.index
                .reserve(new_cap)
                .map_err(|e| crate::error::MemoryError::Internal(format!("ann reserve: {e}")))?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| crate::error::MemoryError::Internal(format!("ann add: {e}")))?;
        self.key_to_id.insert(memory_id.to_string(), id);
        self.id_to_key.insert(id, memory_id.to_string());
        Ok(())
    }

    fn delete(&mut self, memory_id: &str) {
        if let Some(id) = self.key_to_id.remove(memory_id) {
            self.id_to_key.remove(&id);
            let _ = self.index.remove(id);
        }
    }

    fn search(&self, vector: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.index.size() == 0 {
            return Vec::new();
        }
        let Ok(matches) = self.index.search(vector, k) else {
            return Vec::new();
        };
        matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(id, dist)| {
                self.id_to_key
                    .get(id)
                    .map(|key| (key.clone(), (1.0 - dist).clamp(0.0, 1.0)))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.index.size()
    }
}

/// Per-user ANN index. Available only when the `vector-search` feature
/// is compiled in; callers always check [`AnnIndex::is_available`]
/// before relying on `search` returning anything.
pub struct AnnIndex {
    config: AnnConfig,
    #[cfg(feature = "vector-search")]
    shards: DashMap<String, UserShard>,
    #[cfg(not(feature = "vector-search"))]
    _shards: DashMap<String, ()>,
}

impl AnnIndex {
    pub fn new(config: AnnConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "vector-search")]
            shards: DashMap::new(),
            #[cfg(not(feature = "vector-search"))]
            _shards: DashMap::new(),
        }
    }

    #[cfg(feature = "vector-search")]
    pub fn is_available(&self) -> bool {
        true
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn is_available(&self) -> bool {
        false
    }

    /// Idempotent insert by `memory_id` (spec §4.3).
    #[cfg(feature = "vector-search")]
    pub fn insert(&self, user_id: &str, memory_id: &str, vector: &[f32]) -> crate::error::Result<()> {
        if vector.len() != self.config.dimensions {
            return Err(crate::error::MemoryError::Internal(format!(
                "vector dims {} != {}",
                vector.len(),
                self.config.dimensions
            )));
        }
        if !self.shards.contains_key(user_id) {
            let shard = UserShard::new(&self.config)?;
            self.shards.insert(user_id.to_string(), shard);
        }
        let mut shard = self
            .shards
            .get_mut(user_id)
            .expect("just inserted or already present");
        shard.insert(memory_id, vector)
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn insert(&self, _user_id: &str, _memory_id: &str, _vector: &[f32]) -> crate::error::Result<()> {
        Ok(())
    }

    #[cfg(feature = "vector-search")]
    pub fn delete(&self, user_id: &str, memory_id: &str) {
        if let Some(mut shard) = self.shards.get_mut(user_id) {
            shard.delete(memory_id);
        }
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn delete(&self, _user_id: &str, _memory_id: &str) {}

    /// Search within `user_id`'s shard only — there is structurally no
    /// way to retrieve another user's vectors through this call.
    #[cfg(feature = "vector-search")]
    pub fn search(&self, user_id: &str, vector: &[f32], k: usize) -> Vec<(String, f32)> {
        self.shards
            .get(user_id)
            .map(|shard| shard.search(vector, k))
            .unwrap_or_default()
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn search(&self, _user_id: &str, _vector: &[f32], _k: usize) -> Vec<(String, f32)> {
        Vec::new()
    }

    #[cfg(feature = "vector-search")]
    pub fn len_for_user(&self, user_id: &str) -> usize {
        self.shards.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn len_for_user(&self, _user_id: &str) -> usize {
        0
    }

    /// Drop a user's entire shard (spec §4.9: GDPR delete/anonymize).
    #[cfg(feature = "vector-search")]
    pub fn delete_shard(&self, user_id: &str) {
        self.shards.remove(user_id);
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn delete_shard(&self, _user_id: &str) {}
}

#[cfg(all(test, feature = "vector-search"))]
mod tests {
    use super::*;

    fn cfg() -> AnnConfig {
        AnnConfig {
            dimensions: 8,
            m: 16,
            ef_construction: 64,
            ef_search: 64,
        }
    }

    fn vec_for(seed: f32) -> Vec<f32> {
        (0..8).map(|i| ((i as f32 + seed) * 0.1).sin()).collect()
    }

    #[test]
    fn insert_and_search_within_user() {
        let index = AnnIndex::new(cfg());
        index.insert("u1", "m1", &vec_for(1.0)).unwrap();
        index.insert("u1", "m2", &vec_for(50.0)).unwrap();

        let results = index.search("u1", &vec_for(1.0), 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "m1");
    }

    #[test]
    fn search_never_crosses_users() {
        let index = AnnIndex::new(cfg());
        index.insert("u1", "m1", &vec_for(1.0)).unwrap();
        index.insert("u2", "m2", &vec_for(1.0)).unwrap();

        let results = index.search("u1", &vec_for(1.0), 10);
        assert!(results.iter().all(|(k, _)| k != "m2"));
    }

    #[test]
    fn delete_removes_from_search() {
        let index = AnnIndex::new(cfg());
        index.insert("u1", "m1", &vec_for(1.0)).unwrap();
        index.delete("u1", "m1");
        let results = index.search("u1", &vec_for(1.0), 10);
        assert!(results.is_empty());
    }
}
