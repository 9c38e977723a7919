//! Data model (spec §3)
//!
//! `Memory` is the durable row. `Cluster`, `Relationship`,
//! `EmotionalEvolutionPoint`, and `DecayLogEntry` are its satellite
//! tables. All timestamps are seconds since epoch (§6) — never
//! milliseconds; boundary conversions happen only where we talk to
//! clients that expect otherwise (`memory-cli`).

use serde::{Deserialize, Serialize};

/// One of the five categories a memory can carry (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Preference,
    Fact,
    Emotion,
    Event,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Conversation => "conversation",
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Emotion => "emotion",
            MemoryType::Event => "event",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "conversation" => Some(MemoryType::Conversation),
            "preference" => Some(MemoryType::Preference),
            "fact" => Some(MemoryType::Fact),
            "emotion" => Some(MemoryType::Emotion),
            "event" => Some(MemoryType::Event),
            _ => None,
        }
    }
}

/// Encryption metadata attached to a record when `encryption_enabled`
/// is set (spec §4.9). Absent means `content` is plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: String,
    /// 96-bit IV, base64-encoded.
    pub iv: String,
    /// AEAD auth tag, base64-encoded.
    pub auth_tag: String,
}

/// A single durable memory row (`M` in spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub character_id: Option<String>,
    pub conversation_id: Option<String>,
    /// Plaintext, or ciphertext when `encryption_metadata` is `Some`.
    pub content: String,
    pub content_hash: String,
    /// 768 packed float32 values (spec §3, §6 `embedding_dims = 768`).
    pub embedding: Vec<f32>,
    pub importance_score: f32,
    pub emotional_weight: f32,
    pub decay_factor: f32,
    pub access_frequency: u64,
    pub semantic_cluster_id: Option<String>,
    pub memory_type: MemoryType,
    pub cross_character_shared: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed: i64,
    pub encryption_metadata: Option<EncryptionMetadata>,
}

impl Memory {
    /// True when every field-level invariant in spec §3 holds. Used in
    /// tests and as a `debug_assert` at persistence boundaries, never
    /// on the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("user_id must not be empty".into());
        }
        if self.embedding.len() != crate::config::EMBEDDING_DIMS {
            return Err(format!(
                "embedding length {} != {}",
                self.embedding.len(),
                crate::config::EMBEDDING_DIMS
            ));
        }
        if !(0.0..=1.0).contains(&self.decay_factor) {
            return Err("decay_factor out of [0,1]".into());
        }
        if self.encryption_metadata.is_some() && self.content.is_empty() {
            return Err("ciphertext must not be empty when encrypted".into());
        }
        Ok(())
    }
}

/// A cluster centroid (`K` in spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub user_id: String,
    pub centroid: Vec<f32>,
    pub keywords: Vec<String>,
    pub member_count: u64,
    pub avg_importance: f32,
    pub last_updated: i64,
}

/// A cross-character relationship (`R` in spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub user_id: String,
    pub character_a: String,
    pub character_b: String,
    pub strength: f32,
    pub shared_memory_ids: Vec<String>,
    pub interaction_count: u64,
    pub last_interaction: i64,
}

/// One point of an append-only `(user_id, character_id)` time series
/// (`E` in spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalEvolutionPoint {
    pub user_id: String,
    pub character_id: String,
    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,
    pub confidence: f32,
    pub delta: f32,
    pub created_at: i64,
}

/// A single decay-sweep audit row (`D` in spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayLogEntry {
    pub memory_id: String,
    pub original_importance: f32,
    pub decayed_importance: f32,
    pub reason: String,
    pub created_at: i64,
}

/// Caller-supplied fields for `ingest` (spec §4.7). `#[serde(deny_unknown_fields)]`
/// rejects field injection from untrusted JSON payloads, matching the
/// teacher's `IngestInput`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestInput {
    pub text: String,
    pub character_id: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    /// Metadata flags consulted during importance scoring (spec §4.7:
    /// "metadata flags" as one of the importance-score boosts).
    #[serde(default)]
    pub flagged_important: bool,
}

/// Caller-supplied fields for `get_relevant` (spec §4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecallInput {
    pub query: String,
    pub character_id: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    10
}
