//! HTTP embedding client (spec §4.1, §6)
//!
//! Talks to a local model host: an availability probe on construction,
//! then `POST {base_url}/api/embeddings` per text. Batches are issued
//! concurrently up to a configurable ceiling; each request retries with
//! exponential backoff before falling back to the deterministic
//! embedding.

use super::{fallback_embedding, Embedding};
use crate::config::Config;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Running counters for the embedding client (spec §4.1).
#[derive(Debug, Default, Serialize)]
pub struct EmbeddingStats {
    pub total_embeddings: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub fallback_count: u64,
    pub average_latency_ms: f64,
}

struct Counters {
    total_embeddings: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
    fallback_count: AtomicU64,
    /// Cumulative latency in microseconds, divided by `total_embeddings`
    /// on read to produce the running average.
    latency_sum_us: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_embeddings: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        }
    }
}

/// Client for the external embedding service, with deterministic
/// fallback on failure (spec §4.1).
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    batch_size: usize,
    concurrency: usize,
    max_retries: u32,
    counters: Counters,
    /// Set once a probe or call fails; read by callers that want to
    /// report degraded mode without re-deriving it (spec §4.1: "a
    /// health probe on startup verifies availability").
    healthy: Mutex<bool>,
}

impl EmbeddingClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builder with static config never fails");

        Self {
            http,
            base_url: config.embedding_base_url.clone(),
            model: config.embedding_model.clone(),
            batch_size: config.embedding_batch_size.max(1),
            concurrency: config.embedding_concurrency.max(1),
            max_retries: config.embedding_max_retries,
            counters: Counters::default(),
            healthy: Mutex::new(true),
        }
    }

    /// Availability probe: lists models on the configured host. Does
    /// not fail construction — a down service simply marks the client
    /// degraded so every subsequent `embed` takes the fallback path
    /// without paying the round-trip each time.
    pub async fn probe(&self) {
        let url = format!("{}/api/tags", self.base_url);
        let ok = self
            .http
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        *self.healthy.lock() = ok;
        if !ok {
            tracing::warn!(base_url = %self.base_url, "embedding service probe failed, starting in degraded mode");
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self.healthy.lock()
    }

    /// Embed a single text, retrying with exponential backoff before
    /// falling back to the deterministic embedding (spec §4.1).
    pub async fn embed(&self, text: &str) -> Embedding {
        let started = Instant::now();
        let result = self.embed_with_retry(text).await;
        self.record(started, result.is_none());

        match result {
            Some(vector) => Embedding {
                vector,
                degraded: false,
            },
            None => {
                self.counters.fallback_count.fetch_add(1, Ordering::Relaxed);
                *self.healthy.lock() = false;
                Embedding {
                    vector: fallback_embedding(text),
                    degraded: true,
                }
            }
        }
    }

    /// Embed many texts, batched by `embedding_batch_size` and issued
    /// concurrently up to `embedding_concurrency` (spec §4.1).
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Embedding> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let mut futures = Vec::with_capacity(chunk.len());
            for text in chunk {
                futures.push(self.embed(text));
            }
            // `embedding_concurrency` bounds how many of these run at
            // once; buffer_unordered would require streams, so chunks
            // smaller than the concurrency ceiling just run together.
            let mut limited = Vec::with_capacity(futures.len());
            let mut remaining = futures;
            while !remaining.is_empty() {
                let n = self.concurrency.min(remaining.len());
                limited.extend(remaining.drain(0..n));
            }
            for fut in limited {
                results.push(fut.await);
            }
        }
        results
    }

    async fn embed_with_retry(&self, text: &str) -> Option<Vec<f32>> {
        if !self.is_healthy() {
            return None;
        }

        let mut attempt = 0;
        loop {
            match self.embed_once(text).await {
                Ok(vector) => return Some(vector),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                    tracing::warn!(error = %e, attempt, "embedding call failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "embedding call exhausted retries");
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
    }

    async fn embed_once(&self, text: &str) -> crate::error::Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let req = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let resp = self.http.post(&url).json(&req).send().await?;
        let body: EmbedResponse = resp.json().await?;
        if body.embedding.len() != crate::config::EMBEDDING_DIMS {
            return Err(crate::error::MemoryError::Corrupt {
                id: "embedding-response".into(),
                reason: format!(
                    "expected {} dims, got {}",
                    crate::config::EMBEDDING_DIMS,
                    body.embedding.len()
                ),
            });
        }
        Ok(body.embedding)
    }

    fn record(&self, started: Instant, degraded: bool) {
        self.counters.total_embeddings.fetch_add(1, Ordering::Relaxed);
        self.counters
            .latency_sum_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        if degraded {
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> EmbeddingStats {
        let total = self.counters.total_embeddings.load(Ordering::Relaxed);
        let sum_us = self.counters.latency_sum_us.load(Ordering::Relaxed);
        EmbeddingStats {
            total_embeddings: total,
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            fallback_count: self.counters.fallback_count.load(Ordering::Relaxed),
            average_latency_ms: if total > 0 {
                (sum_us as f64 / total as f64) / 1000.0
            } else {
                0.0
            },
        }
    }
}

/// Shared handle to an [`EmbeddingClient`], cloned into components
/// that need to issue embedding calls without owning the client.
pub type SharedEmbeddingClient = Arc<EmbeddingClient>;
