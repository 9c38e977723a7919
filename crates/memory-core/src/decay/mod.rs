//! Decay sweep, retention purge, and cluster optimization (C8, spec §4.8)
//!
//! Decay is an exponential half-life curve over age, multiplied by
//! three direct boosts for emotional weight, access frequency, and
//! importance, then clamped so it never exceeds `decay_factor = 1.0`.

use crate::clock::Clock;
use crate::config::Config;
use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::model::DecayLogEntry;
use crate::storage::Store;
use std::sync::Arc;

/// Memories at or above this importance are retained regardless of age
/// (spec §8: "retention purge never deletes importance_score >= 0.8").
const RETENTION_IMPORTANCE_FLOOR: f32 = 0.8;

/// `decay_factor` below this is considered decayed-out and eligible
/// for cleanup (spec §4.8).
const DECAYED_CLEANUP_THRESHOLD: f32 = 0.05;

/// Memories must sit below the cleanup threshold for at least this
/// long before being removed, so a momentary dip doesn't delete
/// something a boost would otherwise have revived.
const DECAYED_CLEANUP_MIN_AGE_SECS: i64 = 7 * 86_400;

/// Clusters whose centroids are this similar are redundant and get
/// merged (spec §4.8: "cluster optimization merges near-duplicate
/// clusters").
const CLUSTER_MERGE_THRESHOLD: f32 = 0.9;

pub struct DecayEngine {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    half_life_days: f64,
}

impl DecayEngine {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            half_life_days: config.decay_half_life_days,
        }
    }

    /// Recompute every memory's `decay_factor`, logging each change to
    /// `decay_log` (spec §4.8, §3's `DecayLogEntry`).
    pub fn run_sweep(&self) -> Result<u64> {
        let now = self.clock.now_secs();
        let mut updated = 0;
        for memory in self.store.list_all()? {
            let age_days = ((now - memory.created_at).max(0) as f64) / 86_400.0;
            let new_factor = self.decay_factor(
                age_days,
                memory.importance_score,
                memory.access_frequency,
                memory.emotional_weight,
            );

            if (new_factor - memory.decay_factor).abs() > 1e-4 {
                self.store.update_decay_factor(&memory.id, new_factor, now)?;
                self.store.insert_decay_log(&DecayLogEntry {
                    memory_id: memory.id.clone(),
                    original_importance: memory.decay_factor,
                    decayed_importance: new_factor,
                    reason: "scheduled_decay".to_string(),
                    created_at: now,
                })?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// `0.5^(age/half_life) * (1 + 0.5*emotional_weight) * (1 +
    /// 0.2*log10(access+1)) * (0.5 + 0.5*importance)`, clamped to
    /// `[0, 1]` (spec §4.8).
    fn decay_factor(&self, age_days: f64, importance_score: f32, access_frequency: u64, emotional_weight: f32) -> f32 {
        let base = 0.5_f64.powf(age_days / self.half_life_days);
        let emotional_term = 1.0 + 0.5 * emotional_weight.abs() as f64;
        let access_term = 1.0 + 0.2 * ((access_frequency as f64) + 1.0).log10();
        let importance_term = 0.5 + 0.5 * importance_score as f64;
        (base * emotional_term * access_term * importance_term).clamp(0.0, 1.0) as f32
    }

    /// Delete memories decayed below [`DECAYED_CLEANUP_THRESHOLD`] that
    /// have stayed there for at least [`DECAYED_CLEANUP_MIN_AGE_SECS`].
    pub fn cleanup_decayed(&self) -> Result<u64> {
        let now = self.clock.now_secs();
        self.store
            .delete_decayed(DECAYED_CLEANUP_THRESHOLD, DECAYED_CLEANUP_MIN_AGE_SECS, now)
    }

    /// Purge memories past `retention_days` whose importance never
    /// crossed [`RETENTION_IMPORTANCE_FLOOR`] (spec §4.8, §8).
    pub fn purge_retention(&self, retention_days: i64) -> Result<u64> {
        let now = self.clock.now_secs();
        let cutoff = now - retention_days * 86_400;
        let purged = self.store.purge_retention(cutoff, RETENTION_IMPORTANCE_FLOOR)?;
        self.store.purge_decay_log_older_than(cutoff)?;
        Ok(purged)
    }

    /// Merge clusters whose centroids are near-duplicates (cosine ≥
    /// [`CLUSTER_MERGE_THRESHOLD`]), folding the smaller into the
    /// larger with a member-weighted centroid average.
    pub fn optimize_clusters(&self, user_id: &str) -> Result<u64> {
        let mut clusters = self.store.list_clusters_for_user(user_id)?;
        clusters.sort_by_key(|c| std::cmp::Reverse(c.member_count));

        let mut merged_count = 0;
        let mut absorbed = vec![false; clusters.len()];

        for i in 0..clusters.len() {
            if absorbed[i] {
                continue;
            }
            for j in (i + 1)..clusters.len() {
                if absorbed[j] {
                    continue;
                }
                let sim = cosine_similarity(&clusters[i].centroid, &clusters[j].centroid);
                if sim >= CLUSTER_MERGE_THRESHOLD {
                    let (n_i, n_j) = (clusters[i].member_count as f32, clusters[j].member_count as f32);
                    let total = n_i + n_j;
                    let merged_centroid: Vec<f32> = clusters[i]
                        .centroid
                        .iter()
                        .zip(clusters[j].centroid.iter())
                        .map(|(a, b)| (a * n_i + b * n_j) / total)
                        .collect();
                    clusters[i].centroid = merged_centroid;
                    clusters[i].member_count += clusters[j].member_count;
                    clusters[i].avg_importance = (clusters[i].avg_importance * n_i + clusters[j].avg_importance * n_j) / total;
                    clusters[i].last_updated = self.clock.now_secs();
                    absorbed[j] = true;
                    merged_count += 1;
                }
            }
        }

        for (idx, cluster) in clusters.iter().enumerate() {
            if absorbed[idx] {
                self.store.delete_cluster(&cluster.id)?;
            } else {
                self.store.upsert_cluster(cluster)?;
            }
        }

        Ok(merged_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::model::{Cluster, Memory, MemoryType};

    fn memory_with(id: &str, created_at: i64, importance: f32, access_frequency: u64, decay_factor: f32) -> Memory {
        Memory {
            id: id.to_string(),
            user_id: "u1".to_string(),
            character_id: None,
            conversation_id: None,
            content: "content".into(),
            content_hash: id.to_string(),
            embedding: vec![0.1; crate::config::EMBEDDING_DIMS],
            importance_score: importance,
            emotional_weight: 0.0,
            decay_factor,
            access_frequency,
            semantic_cluster_id: None,
            memory_type: MemoryType::Fact,
            cross_character_shared: false,
            created_at,
            updated_at: created_at,
            last_accessed: created_at,
            encryption_metadata: None,
        }
    }

    fn harness() -> (DecayEngine, Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("decay.db")).unwrap());
        let config = Config::for_tests();
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_000_000_000));
        let engine = DecayEngine::new(store.clone(), clock, &config);
        (engine, store, dir)
    }

    #[test]
    fn sweep_reduces_decay_factor_for_old_memories() {
        let (engine, store, _dir) = harness();
        let old = memory_with("m1", 1_000_000_000 - 120 * 86_400, 0.2, 0, 1.0);
        store.insert_memory(&old).unwrap();

        engine.run_sweep().unwrap();
        let updated = store.get_memory("u1", "m1").unwrap().unwrap();
        assert!(updated.decay_factor < 1.0);
    }

    #[test]
    fn important_memories_decay_slower() {
        let (engine, store, _dir) = harness();
        let low_importance = memory_with("m1", 1_000_000_000 - 60 * 86_400, 0.0, 0, 1.0);
        let high_importance = memory_with("m2", 1_000_000_000 - 60 * 86_400, 0.9, 0, 1.0);
        store.insert_memory(&low_importance).unwrap();
        store.insert_memory(&high_importance).unwrap();

        engine.run_sweep().unwrap();
        let low = store.get_memory("u1", "m1").unwrap().unwrap();
        let high = store.get_memory("u1", "m2").unwrap().unwrap();
        assert!(high.decay_factor > low.decay_factor);
    }

    #[test]
    fn purge_retention_respects_importance_floor() {
        let (engine, store, _dir) = harness();
        let protected = memory_with("m1", 0, 0.9, 0, 1.0);
        let expired = memory_with("m2", 0, 0.1, 0, 1.0);
        store.insert_memory(&protected).unwrap();
        store.insert_memory(&expired).unwrap();

        engine.purge_retention(1).unwrap();
        assert!(store.get_memory("u1", "m1").unwrap().is_some());
        assert!(store.get_memory("u1", "m2").unwrap().is_none());
    }

    #[test]
    fn optimize_clusters_merges_near_duplicates() {
        let (engine, store, _dir) = harness();
        let a = Cluster {
            id: "c1".into(),
            user_id: "u1".into(),
            centroid: vec![1.0, 0.0, 0.0],
            keywords: vec![],
            member_count: 3,
            avg_importance: 0.5,
            last_updated: 0,
        };
        let b = Cluster {
            id: "c2".into(),
            user_id: "u1".into(),
            centroid: vec![1.0, 0.01, 0.0],
            keywords: vec![],
            member_count: 1,
            avg_importance: 0.5,
            last_updated: 0,
        };
        store.upsert_cluster(&a).unwrap();
        store.upsert_cluster(&b).unwrap();

        let merged = engine.optimize_clusters("u1").unwrap();
        assert_eq!(merged, 1);
        let remaining = store.list_clusters_for_user("u1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].member_count, 4);
    }
}
