//! Root object wiring C1–C11 together (spec §2, §9)
//!
//! `Engine` is constructed once per process and passed around
//! explicitly — there is no global singleton here, so tests can spin
//! up as many independent engines as they need against separate
//! SQLite files.

use std::sync::Arc;

use crate::cache::TieredCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::decay::DecayEngine;
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::ingestion::Ingestor;
use crate::lifecycle::LifecycleManager;
use crate::model::{IngestInput, Memory, RecallInput};
use crate::monitoring::Monitor;
use crate::retrieval::Retriever;
use crate::search::{AnnConfig, AnnIndex};
use crate::security::{ContentCipher, GdprOps, PlaintextCipher, VaultCipher};
use crate::storage::Store;

/// The assembled engine: every C1–C11 component behind one handle.
pub struct Engine {
    store: Arc<Store>,
    cache: Arc<TieredCache>,
    embedding_client: Arc<EmbeddingClient>,
    ann_index: Arc<AnnIndex>,
    cipher: Arc<dyn ContentCipher>,
    clock: Arc<dyn Clock>,
    config: Config,

    retriever: Retriever,
    ingestor: Ingestor,
    decay: DecayEngine,
    gdpr: GdprOps,

    pub lifecycle: Arc<LifecycleManager>,
    pub monitor: Arc<Monitor>,
}

impl Engine {
    /// Open (or create) the store at `path` and wire every component
    /// against it using `config`. Probes the embedding service so
    /// degraded mode is known before the first real request.
    pub async fn open(path: &std::path::Path, config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(path)?);
        Self::with_store(store, config).await
    }

    /// Same as [`Engine::open`] but at the platform-default data
    /// directory (spec §4.4's `ProjectDirs`-based path).
    pub async fn open_default(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open_default()?);
        Self::with_store(store, config).await
    }

    /// Like [`Engine::open`], but with an injected clock so integration
    /// tests can backdate memories and assert exact decay/TTL boundary
    /// behavior without sleeping (spec §8's decay scenario).
    #[cfg(any(test, feature = "test-support"))]
    pub async fn open_with_clock(path: &std::path::Path, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Arc::new(Store::open(path)?);
        Self::with_store_and_clock(store, config, clock).await
    }

    async fn with_store(store: Arc<Store>, config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_store_and_clock(store, config, clock).await
    }

    async fn with_store_and_clock(store: Arc<Store>, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let cache = Arc::new(TieredCache::new(&config));
        let embedding_client = Arc::new(EmbeddingClient::new(&config));
        embedding_client.probe().await;
        let ann_index = Arc::new(AnnIndex::new(AnnConfig::from(&config)));

        let cipher: Arc<dyn ContentCipher> = if config.encryption_enabled {
            let master_key = config
                .master_encryption_key
                .as_deref()
                .ok_or_else(|| crate::error::MemoryError::Internal("encryption enabled without master key".into()))?;
            Arc::new(VaultCipher::new(master_key, config.pbkdf2_iterations))
        } else {
            Arc::new(PlaintextCipher)
        };

        let retriever = Retriever::new(
            store.clone(),
            cache.clone(),
            embedding_client.clone(),
            ann_index.clone(),
            cipher.clone(),
            clock.clone(),
            config.clone(),
        );
        let ingestor = Ingestor::new(
            store.clone(),
            cache.clone(),
            embedding_client.clone(),
            ann_index.clone(),
            cipher.clone(),
            clock.clone(),
            config.clone(),
        );
        let decay = DecayEngine::new(store.clone(), clock.clone(), &config);
        let gdpr = GdprOps::new(store.clone(), cache.clone(), ann_index.clone(), cipher.clone(), clock.clone());

        Ok(Self {
            store,
            cache,
            embedding_client,
            ann_index,
            cipher,
            clock: clock.clone(),
            config,
            retriever,
            ingestor,
            decay,
            gdpr,
            lifecycle: Arc::new(LifecycleManager::new()),
            monitor: Arc::new(Monitor::new(clock)),
        })
    }

    pub async fn ingest(&self, user_id: &str, input: IngestInput) -> Result<Memory> {
        let started = std::time::Instant::now();
        let result = self.ingestor.ingest(user_id, input).await;
        self.monitor.record_latency("ingest", started.elapsed());
        self.monitor.incr("ingest_total", 1);
        if result.is_err() {
            self.monitor.incr("ingest_errors", 1);
        }
        result
    }

    pub async fn recall(&self, user_id: &str, input: &RecallInput) -> Result<Vec<Memory>> {
        let started = std::time::Instant::now();
        let result = self.retriever.get_relevant(user_id, input).await;
        self.monitor.record_latency("recall", started.elapsed());
        self.monitor.incr("recall_total", 1);
        if result.is_err() {
            self.monitor.incr("recall_errors", 1);
        }
        result
    }

    /// Run one decay sweep + decayed-row cleanup, as a background
    /// interval would (spec §4.8). Exposed directly so `memory-cli`
    /// and tests can trigger it deterministically instead of waiting
    /// on a timer.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let decayed = self.decay.run_sweep()?;
        let cleaned = self.decay.cleanup_decayed()?;
        let purged = self.decay.purge_retention(self.config.retention_days)?;
        self.store.analyze()?;
        self.monitor.set_gauge("last_maintenance_at", self.clock.now_secs());
        Ok(MaintenanceReport {
            decay_updates: decayed,
            cleaned_up: cleaned,
            retention_purged: purged,
        })
    }

    pub fn optimize_clusters(&self, user_id: &str) -> Result<u64> {
        self.decay.optimize_clusters(user_id)
    }

    pub fn gdpr_export(&self, user_id: &str) -> Result<serde_json::Value> {
        self.gdpr.export(user_id)
    }

    pub fn gdpr_delete(&self, user_id: &str) -> Result<u64> {
        self.gdpr.delete(user_id)
    }

    pub fn gdpr_anonymize(&self, user_id: &str) -> Result<String> {
        self.gdpr.anonymize(user_id)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            embedding: self.embedding_client.stats(),
            db_file_bytes: self.store.file_size_bytes().unwrap_or(0),
            ingest_total: self.monitor.counter("ingest_total").value,
            recall_total: self.monitor.counter("recall_total").value,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn ann_index(&self) -> &Arc<AnnIndex> {
        &self.ann_index
    }

    /// Idempotent shutdown: aborts any background tasks registered
    /// with `lifecycle` (spec §4.10).
    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MaintenanceReport {
    pub decay_updates: u64,
    pub cleaned_up: u64,
    pub retention_purged: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct EngineStats {
    pub embedding: crate::embeddings::EmbeddingStats,
    pub db_file_bytes: u64,
    pub ingest_total: u64,
    pub recall_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn harness() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests();
        config.embedding_base_url = "http://127.0.0.1:1".to_string();
        config.embedding_max_retries = 0;
        let engine = Engine::open(&dir.path().join("engine.db"), config).await.unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn ingest_then_recall_round_trips() {
        let (engine, _dir) = harness().await;
        engine
            .ingest(
                "u1",
                IngestInput {
                    text: "my favorite color is blue".into(),
                    character_id: None,
                    conversation_id: None,
                    memory_type: None,
                    flagged_important: true,
                },
            )
            .await
            .unwrap();

        let results = engine
            .recall(
                "u1",
                &RecallInput {
                    query: "what is my favorite color?".into(),
                    character_id: None,
                    k: 5,
                },
            )
            .await
            .unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn maintenance_runs_without_error() {
        let (engine, _dir) = harness().await;
        let report = engine.run_maintenance().unwrap();
        assert_eq!(report.decay_updates, 0);
    }

    #[tokio::test]
    async fn gdpr_delete_clears_stats() {
        let (engine, _dir) = harness().await;
        engine
            .ingest(
                "u1",
                IngestInput {
                    text: "a fact worth keeping".into(),
                    character_id: None,
                    conversation_id: None,
                    memory_type: None,
                    flagged_important: false,
                },
            )
            .await
            .unwrap();

        let deleted = engine.gdpr_delete("u1").unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (engine, _dir) = harness().await;
        engine.shutdown();
        engine.shutdown();
    }
}
