//! Configuration (spec §6)
//!
//! Every field enumerated in spec.md §6 with its documented default.
//! `jwt_secret` and `master_encryption_key` have no default: a
//! production boot with either absent fails closed.

use crate::error::{MemoryError, Result};
use serde::Deserialize;
use std::env;

/// Fixed embedding dimensionality (spec §3, §6: "embedding_dims = 768 (fixed)").
pub const EMBEDDING_DIMS: usize = 768;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the model the embedding service should use.
    pub embedding_model: String,

    // ---- Tiered cache (C2) ----
    pub cache_l1_size: usize,
    pub cache_l2_size: usize,
    pub cache_l3_size: usize,
    pub cache_l3_ttl_ms: u64,
    pub semantic_cache_threshold: f32,

    // ---- ANN index (C3) ----
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Corpus size above which candidate generation uses the ANN index
    /// instead of a linear scan (spec §4.6.3, `N_ann`).
    pub ann_threshold: usize,

    // ---- Connection pool (C5) ----
    pub pool_max_conns: usize,
    pub pool_acquire_timeout_ms: u64,

    // ---- Decay & retention (C8) ----
    pub decay_half_life_days: f64,
    pub decay_sweep_interval_ms: u64,
    pub retention_days: i64,

    // ---- Retrieval (C6) ----
    pub relevance_threshold: f32,
    pub high_importance_bypass: f32,
    pub max_context_tokens: usize,
    pub rerank_top_k: usize,
    pub rerank_final_k: usize,
    pub diversity_penalty: f32,
    pub rrf_k: f32,
    pub semantic_weight: f32,
    pub keyword_weight: f32,

    // ---- Embedding client (C1) ----
    pub embedding_batch_size: usize,
    pub embedding_concurrency: usize,
    pub embedding_max_retries: u32,
    pub embedding_base_url: String,

    // ---- Security (C9) ----
    pub encryption_enabled: bool,
    pub jwt_secret: Option<String>,
    pub master_encryption_key: Option<String>,
    pub pbkdf2_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_model: "nomic-embed-text".to_string(),
            cache_l1_size: 10_000,
            cache_l2_size: 2_000,
            cache_l3_size: 1_000,
            cache_l3_ttl_ms: 5 * 60 * 1000,
            semantic_cache_threshold: 0.95,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
            ann_threshold: 1_000,
            pool_max_conns: 15,
            pool_acquire_timeout_ms: 30_000,
            decay_half_life_days: 30.0,
            decay_sweep_interval_ms: 60 * 60 * 1000,
            retention_days: 90,
            relevance_threshold: 0.3,
            high_importance_bypass: 0.8,
            max_context_tokens: 2000,
            rerank_top_k: 100,
            rerank_final_k: 10,
            diversity_penalty: 0.1,
            rrf_k: 60.0,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            embedding_batch_size: 10,
            embedding_concurrency: 5,
            embedding_max_retries: 3,
            embedding_base_url: "http://localhost:11434".to_string(),
            encryption_enabled: true,
            jwt_secret: None,
            master_encryption_key: None,
            pbkdf2_iterations: 100_000,
        }
    }
}

/// Non-secret fields loadable from a TOML file, in the pattern used by
/// the terminal front ends in the retrieval pack (`dirs`/`toml`-based
/// app config).
#[derive(Debug, Deserialize, Default)]
struct TomlOverrides {
    embedding_model: Option<String>,
    embedding_base_url: Option<String>,
    cache_l1_size: Option<usize>,
    cache_l2_size: Option<usize>,
    cache_l3_size: Option<usize>,
    hnsw_m: Option<usize>,
    hnsw_ef_construction: Option<usize>,
    hnsw_ef_search: Option<usize>,
    pool_max_conns: Option<usize>,
    decay_half_life_days: Option<f64>,
    retention_days: Option<i64>,
    relevance_threshold: Option<f32>,
    encryption_enabled: Option<bool>,
}

impl Config {
    /// Load from `MEMORY_*` environment variables, falling back to
    /// defaults. Fails closed if encryption is enabled (the default)
    /// and either secret is absent — spec §4.9's "startup fails closed
    /// in production" requirement.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("MEMORY_EMBEDDING_MODEL") {
            cfg.embedding_model = v;
        }
        if let Ok(v) = env::var("MEMORY_EMBEDDING_BASE_URL") {
            cfg.embedding_base_url = v;
        }
        if let Ok(v) = env::var("MEMORY_ENCRYPTION_ENABLED") {
            cfg.encryption_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        cfg.jwt_secret = env::var("MEMORY_JWT_SECRET").ok();
        cfg.master_encryption_key = env::var("MEMORY_MASTER_KEY").ok();

        cfg.validate()?;
        Ok(cfg)
    }

    /// Merge in non-secret overrides from a TOML config file.
    pub fn merge_toml(mut self, contents: &str) -> Result<Self> {
        let overrides: TomlOverrides = toml::from_str(contents)
            .map_err(|e| MemoryError::Internal(format!("invalid config toml: {e}")))?;

        if let Some(v) = overrides.embedding_model {
            self.embedding_model = v;
        }
        if let Some(v) = overrides.embedding_base_url {
            self.embedding_base_url = v;
        }
        if let Some(v) = overrides.cache_l1_size {
            self.cache_l1_size = v;
        }
        if let Some(v) = overrides.cache_l2_size {
            self.cache_l2_size = v;
        }
        if let Some(v) = overrides.cache_l3_size {
            self.cache_l3_size = v;
        }
        if let Some(v) = overrides.hnsw_m {
            self.hnsw_m = v;
        }
        if let Some(v) = overrides.hnsw_ef_construction {
            self.hnsw_ef_construction = v;
        }
        if let Some(v) = overrides.hnsw_ef_search {
            self.hnsw_ef_search = v;
        }
        if let Some(v) = overrides.pool_max_conns {
            self.pool_max_conns = v;
        }
        if let Some(v) = overrides.decay_half_life_days {
            self.decay_half_life_days = v;
        }
        if let Some(v) = overrides.retention_days {
            self.retention_days = v;
        }
        if let Some(v) = overrides.relevance_threshold {
            self.relevance_threshold = v;
        }
        if let Some(v) = overrides.encryption_enabled {
            self.encryption_enabled = v;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.encryption_enabled
            && (self.jwt_secret.is_none() || self.master_encryption_key.is_none())
        {
            return Err(MemoryError::Internal(
                "encryption_enabled requires MEMORY_JWT_SECRET and MEMORY_MASTER_KEY".into(),
            ));
        }
        Ok(())
    }

    /// A config suitable for tests: encryption on with fixed, obviously
    /// non-production secrets.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_tests() -> Self {
        let mut cfg = Self::default();
        cfg.jwt_secret = Some("test-jwt-secret-not-for-production".to_string());
        cfg.master_encryption_key = Some("test-master-key-not-for-production".to_string());
        cfg.ann_threshold = 4; // exercise the ANN path with small fixtures
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_fixed_embedding_dims() {
        assert_eq!(EMBEDDING_DIMS, 768);
    }

    #[test]
    fn validate_fails_closed_without_secrets() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_passes_with_secrets_or_disabled() {
        let mut cfg = Config::default();
        cfg.encryption_enabled = false;
        assert!(cfg.validate().is_ok());

        let cfg = Config::for_tests();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn merge_toml_overrides_fields() {
        let cfg = Config::for_tests();
        let merged = cfg
            .merge_toml("retention_days = 30\nhnsw_m = 32\n")
            .unwrap();
        assert_eq!(merged.retention_days, 30);
        assert_eq!(merged.hnsw_m, 32);
    }
}
