//! `get_relevant` retrieval pipeline (C6, spec §4.6)
//!
//! Cache probe (L3 exact, then L2 semantic) → embed the query (L1
//! cache in front of the embedding client) → candidate generation (ANN
//! above `ann_threshold`, linear scan below) fused with an FTS5
//! keyword pass → cluster-biased composite scoring → relevance gate →
//! diversity-penalized re-rank → side effects (access bookkeeping,
//! cache writes).

use crate::cache::TieredCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::embeddings::{cosine_similarity, EmbeddingClient};
use crate::error::Result;
use crate::model::{Memory, RecallInput};
use crate::search::{
    composite_score, keyword_search, passes_relevance_gate, rerank, AnnIndex, EmotionalLexicon,
    HybridConfig, HybridFuser, RankedCandidate, ScoringContext,
};
use crate::security::{character_visible, ContentCipher};
use crate::storage::Store;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Retriever {
    store: Arc<Store>,
    cache: Arc<TieredCache>,
    embedding_client: Arc<EmbeddingClient>,
    ann_index: Arc<AnnIndex>,
    cipher: Arc<dyn ContentCipher>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl Retriever {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<TieredCache>,
        embedding_client: Arc<EmbeddingClient>,
        ann_index: Arc<AnnIndex>,
        cipher: Arc<dyn ContentCipher>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            store,
            cache,
            embedding_client,
            ann_index,
            cipher,
            clock,
            config,
        }
    }

    pub async fn get_relevant(&self, user_id: &str, input: &RecallInput) -> Result<Vec<Memory>> {
        let query_hash = blake3::hash(input.query.as_bytes()).to_hex().to_string();

        if let Some(cached) = self.cache.l3.get(
            &self.clock,
            user_id,
            &query_hash,
            input.k,
            input.character_id.as_deref(),
        ) {
            if let Ok(memories) = serde_json::from_value::<Vec<Memory>>(cached) {
                return Ok(memories);
            }
        }

        let query_vector = self.resolve_query_embedding(&input.query).await;

        if let Some(cached) = self.cache.l2.get(user_id, &input.query, &query_vector) {
            if let Ok(memories) = serde_json::from_value::<Vec<Memory>>(cached) {
                return Ok(memories);
            }
        }

        let results = self.compute_fresh(user_id, input, &query_vector)?;

        let serialized =
            serde_json::to_value(&results).unwrap_or(serde_json::Value::Null);
        self.cache.l3.put(
            &self.clock,
            user_id,
            &query_hash,
            input.k,
            input.character_id.as_deref(),
            serialized.clone(),
        );
        self.cache.l2.put(user_id, &input.query, query_vector, serialized);

        Ok(results)
    }

    async fn resolve_query_embedding(&self, query: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.l1.get(query, &self.config.embedding_model) {
            return cached;
        }
        let embedding = self.embedding_client.embed(query).await;
        self.cache
            .l1
            .put(query, &self.config.embedding_model, embedding.vector.clone());
        embedding.vector
    }

    fn compute_fresh(&self, user_id: &str, input: &RecallInput, query_vector: &[f32]) -> Result<Vec<Memory>> {
        let total = self.store.count_for_user(user_id)? as usize;

        let semantic: Vec<(String, f32)> = if self.ann_index.is_available() && total > self.config.ann_threshold {
            self.ann_index.search(user_id, query_vector, self.config.rerank_top_k)
        } else {
            let mut scored: Vec<(String, f32)> = self
                .store
                .list_for_user(user_id)?
                .into_iter()
                .map(|m| (m.id, cosine_similarity(query_vector, &m.embedding)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(self.config.rerank_top_k);
            scored
        };
        let similarity_by_id: HashMap<String, f32> = semantic.iter().cloned().collect();

        let keyword = {
            let reader = self.store.reader_connection().lock();
            keyword_search(&reader, user_id, &input.query, self.config.rerank_top_k)?
        };

        let fused = HybridFuser::new(HybridConfig::from(&self.config)).fuse(&semantic, &keyword);

        let mut decrypted_candidates = Vec::new();
        for (id, _) in fused.iter().take(self.config.rerank_top_k) {
            let Some(memory) = self.store.get_memory(user_id, id)? else {
                continue;
            };
            if !character_visible(
                memory.character_id.as_deref(),
                memory.cross_character_shared,
                input.character_id.as_deref(),
            ) {
                continue;
            }
            let mut decrypted = memory.clone();
            decrypted.content = self.cipher.decrypt(user_id, &memory)?;
            decrypted_candidates.push(decrypted);
        }

        let best_cluster = best_cluster_id(&decrypted_candidates, &similarity_by_id);
        let lexicon = EmotionalLexicon::default();
        let now_secs = self.clock.now_secs();

        let mut scored_candidates: Vec<(Memory, f32)> = Vec::new();
        for memory in decrypted_candidates {
            let content_similarity = *similarity_by_id.get(&memory.id).unwrap_or(&0.0);
            let is_best_cluster_member = best_cluster.is_some() && memory.semantic_cluster_id == best_cluster;
            let ctx = ScoringContext {
                query: &input.query,
                content_similarity,
                is_best_cluster_member,
                now_secs,
                lexicon: &lexicon,
            };
            let composite = composite_score(&memory, &ctx);
            if passes_relevance_gate(
                composite,
                memory.importance_score,
                self.config.relevance_threshold,
                self.config.high_importance_bypass,
            ) {
                scored_candidates.push((memory, composite));
            }
        }

        let ranked: Vec<RankedCandidate> = scored_candidates
            .iter()
            .map(|(m, score)| RankedCandidate {
                id: m.id.clone(),
                score: *score,
                embedding: m.embedding.clone(),
            })
            .collect();
        let final_k = input.k.min(self.config.rerank_final_k);
        let reranked = rerank(ranked, final_k, self.config.diversity_penalty);

        let by_id: HashMap<String, Memory> =
            scored_candidates.into_iter().map(|(m, _)| (m.id.clone(), m)).collect();
        let mut results: Vec<Memory> = reranked
            .into_iter()
            .filter_map(|c| by_id.get(&c.id).cloned())
            .collect();
        results.truncate(input.k);

        for memory in &results {
            self.store.record_access(user_id, &memory.id, now_secs)?;
        }

        Ok(results)
    }
}

/// The cluster with the highest mean content similarity among the
/// current candidates wins the ×2.0 bias (spec §4.6.4).
fn best_cluster_id(candidates: &[Memory], similarity_by_id: &HashMap<String, f32>) -> Option<String> {
    let mut sums: HashMap<String, (f32, u32)> = HashMap::new();
    for memory in candidates {
        if let Some(cluster_id) = &memory.semantic_cluster_id {
            let sim = *similarity_by_id.get(&memory.id).unwrap_or(&0.0);
            let entry = sums.entry(cluster_id.clone()).or_insert((0.0, 0));
            entry.0 += sim;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .max_by(|a, b| {
            let avg_a = a.1 .0 / a.1 .1 as f32;
            let avg_b = b.1 .0 / b.1 .1 as f32;
            avg_a.partial_cmp(&avg_b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(cluster_id, _)| cluster_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::model::MemoryType;
    use crate::search::AnnConfig;
    use crate::security::PlaintextCipher;

    fn sample_memory(id: &str, user_id: &str, content: &str, embedding: Vec<f32>) -> Memory {
        Memory {
            id: id.to_string(),
            user_id: user_id.to_string(),
            character_id: None,
            conversation_id: None,
            content: content.to_string(),
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            embedding,
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

    fn harness() -> (Retriever, Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("retrieval.db")).unwrap());
        let mut config = Config::for_tests();
        config.embedding_base_url = "http://127.0.0.1:1".to_string();
        config.embedding_max_retries = 0;
        let cache = Arc::new(TieredCache::new(&config));
        let embedding_client = Arc::new(EmbeddingClient::new(&config));
        let ann_index = Arc::new(AnnIndex::new(AnnConfig::from(&config)));
        let cipher: Arc<dyn ContentCipher> = Arc::new(PlaintextCipher);
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
        let retriever = Retriever::new(store.clone(), cache, embedding_client, ann_index, cipher, clock, config);
        (retriever, store, dir)
    }

    #[tokio::test]
    async fn cross_user_isolation_in_linear_scan() {
        let (retriever, store, _dir) = harness();
        store
            .insert_memory(&sample_memory("m1", "u1", "my name is Layne", vec![1.0; crate::config::EMBEDDING_DIMS]))
            .unwrap();
        store
            .insert_memory(&sample_memory("m2", "u2", "my name is Bob", vec![1.0; crate::config::EMBEDDING_DIMS]))
            .unwrap();

        let input = RecallInput {
            query: "what's my name?".into(),
            character_id: None,
            k: 10,
        };
        let results = retriever.get_relevant("u1", &input).await.unwrap();
        assert!(results.iter().all(|m| m.user_id == "u1"));
    }

    #[tokio::test]
    async fn relevance_gate_filters_out_unimportant_unrelated_memories() {
        let (retriever, store, _dir) = harness();
        let mut unrelated = sample_memory("m1", "u1", "irrelevant filler text", vec![-1.0; crate::config::EMBEDDING_DIMS]);
        unrelated.importance_score = 0.05;
        store.insert_memory(&unrelated).unwrap();

        let input = RecallInput {
            query: "what's my name?".into(),
            character_id: None,
            k: 10,
        };
        let results = retriever.get_relevant("u1", &input).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn repeated_query_hits_l3_cache() {
        let (retriever, store, _dir) = harness();
        store
            .insert_memory(&sample_memory("m1", "u1", "my name is Layne", vec![1.0; crate::config::EMBEDDING_DIMS]))
            .unwrap();

        let input = RecallInput {
            query: "what's my name?".into(),
            character_id: None,
            k: 10,
        };
        let first = retriever.get_relevant("u1", &input).await.unwrap();
        let second = retriever.get_relevant("u1", &input).await.unwrap();
        assert_eq!(first.len(), second.len());
    }
}
