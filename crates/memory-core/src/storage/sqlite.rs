//! Persistent store (C4, spec §4.4)
//!
//! Separate reader/writer connections over one SQLite file (teacher's
//! `Storage` pattern in `storage/sqlite.rs`): all methods take `&self`
//! so the store is `Send + Sync` and callers hold it behind `Arc`
//! rather than `Arc<Mutex<Store>>`.

use crate::embeddings::{pack_vector, unpack_vector};
use crate::error::{MemoryError, Result};
use crate::model::{EncryptionMetadata, Memory, MemoryType};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA mmap_size = 268435456;
         PRAGMA journal_size_limit = 67108864;",
    )?;
    Ok(())
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let embedding_blob: Vec<u8> = row.get("embedding")?;
    let embedding = unpack_vector(&embedding_blob).unwrap_or_default();

    let memory_type_str: String = row.get("memory_type")?;
    let memory_type = MemoryType::parse_name(&memory_type_str).unwrap_or(MemoryType::Conversation);

    let algorithm: Option<String> = row.get("encryption_algorithm")?;
    let iv: Option<String> = row.get("encryption_iv")?;
    let auth_tag: Option<String> = row.get("encryption_auth_tag")?;
    let encryption_metadata = match (algorithm, iv, auth_tag) {
        (Some(algorithm), Some(iv), Some(auth_tag)) => Some(EncryptionMetadata { algorithm, iv, auth_tag }),
        _ => None,
    };

    Ok(Memory {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        character_id: row.get("character_id")?,
        conversation_id: row.get("conversation_id")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        embedding,
        importance_score: row.get("importance_score")?,
        emotional_weight: row.get("emotional_weight")?,
        decay_factor: row.get("decay_factor")?,
        access_frequency: row.get::<_, i64>("access_frequency")? as u64,
        semantic_cluster_id: row.get("semantic_cluster_id")?,
        memory_type,
        cross_character_shared: row.get::<_, i64>("cross_character_shared")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_accessed: row.get("last_accessed")?,
        encryption_metadata,
    })
}

impl Store {
    /// Default on-disk location, following the teacher's
    /// `directories::ProjectDirs` + owner-only permissions pattern.
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("com", "memory-engine", "core")
            .ok_or_else(|| MemoryError::Internal("could not determine project directories".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700));
        }
        Ok(data_dir.join("memory.db"))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let writer_conn = Connection::open(path)?;
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path: path.to_path_buf(),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(&Self::default_path()?)
    }

    // ---- memories ----

    pub fn find_by_content_hash(&self, user_id: &str, content_hash: &str) -> Result<Option<Memory>> {
        let reader = self.reader.lock();
        reader
            .query_row(
                "SELECT * FROM memories WHERE user_id = ?1 AND content_hash = ?2",
                params![user_id, content_hash],
                row_to_memory,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_memory(&self, user_id: &str, id: &str) -> Result<Option<Memory>> {
        let reader = self.reader.lock();
        reader
            .query_row(
                "SELECT * FROM memories WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
                row_to_memory,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let writer = self.writer.lock();
        let (algorithm, iv, auth_tag) = match &memory.encryption_metadata {
            Some(m) => (Some(m.algorithm.clone()), Some(m.iv.clone()), Some(m.auth_tag.clone())),
            None => (None, None, None),
        };
        writer.execute(
            "INSERT INTO memories (
                id, user_id, character_id, conversation_id, content, content_hash, embedding,
                importance_score, emotional_weight, decay_factor, access_frequency,
                semantic_cluster_id, memory_type, cross_character_shared,
                created_at, updated_at, last_accessed,
                encryption_algorithm, encryption_iv, encryption_auth_tag
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                memory.id,
                memory.user_id,
                memory.character_id,
                memory.conversation_id,
                memory.content,
                memory.content_hash,
                pack_vector(&memory.embedding),
                memory.importance_score,
                memory.emotional_weight,
                memory.decay_factor,
                memory.access_frequency as i64,
                memory.semantic_cluster_id,
                memory.memory_type.as_str(),
                memory.cross_character_shared as i64,
                memory.created_at,
                memory.updated_at,
                memory.last_accessed,
                algorithm,
                iv,
                auth_tag,
            ],
        )?;
        Ok(())
    }

    /// Coalesce a duplicate ingest: bump `access_frequency` by one
    /// (spec §3 invariant, §8 dedup scenario).
    pub fn bump_access_frequency(&self, user_id: &str, id: &str, now: i64) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET access_frequency = access_frequency + 1, last_accessed = ?3, updated_at = ?3
             WHERE user_id = ?1 AND id = ?2",
            params![user_id, id, now],
        )?;
        Ok(())
    }

    /// Retrieval side effect: increment access and stamp `last_accessed`
    /// (spec §4.6 step 9), without touching `updated_at` — only
    /// ingestion/decay/cluster mutate that field (spec §3 lifecycle).
    pub fn record_access(&self, user_id: &str, id: &str, now: i64) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET access_frequency = access_frequency + 1, last_accessed = ?3
             WHERE user_id = ?1 AND id = ?2",
            params![user_id, id, now],
        )?;
        Ok(())
    }

    pub fn update_cluster_id(&self, user_id: &str, id: &str, cluster_id: Option<&str>) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET semantic_cluster_id = ?3 WHERE user_id = ?1 AND id = ?2",
            params![user_id, id, cluster_id],
        )?;
        Ok(())
    }

    pub fn update_cross_character_shared(&self, user_id: &str, id: &str, shared: bool) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET cross_character_shared = ?3 WHERE user_id = ?1 AND id = ?2",
            params![user_id, id, shared as i64],
        )?;
        Ok(())
    }

    /// All memories for `user_id`, for linear-scan candidate generation
    /// when the corpus is below `ann_threshold` (spec §4.6.3) or the
    /// `vector-search` feature is disabled.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>> {
        let reader = self.reader.lock();
        let mut stmt = reader.prepare("SELECT * FROM memories WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_for_user(&self, user_id: &str) -> Result<u64> {
        let reader = self.reader.lock();
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// All memories across every user, used by decay/retention/cluster
    /// background sweeps which are global, not per-user.
    pub fn list_all(&self) -> Result<Vec<Memory>> {
        let reader = self.reader.lock();
        let mut stmt = reader.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn update_decay_factor(&self, id: &str, decay_factor: f32, updated_at: i64) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET decay_factor = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, decay_factor, updated_at],
        )?;
        Ok(())
    }

    pub fn insert_decay_log(&self, entry: &crate::model::DecayLogEntry) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "INSERT INTO decay_log (memory_id, original_importance, decayed_importance, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.memory_id,
                entry.original_importance,
                entry.decayed_importance,
                entry.reason,
                entry.created_at
            ],
        )?;
        Ok(())
    }

    /// Delete rows matching `decay_factor < threshold` AND `updated_at`
    /// older than `max_age_secs` (spec §4.8 decayed cleanup).
    pub fn delete_decayed(&self, decay_threshold: f32, min_age_secs: i64, now: i64) -> Result<u64> {
        let writer = self.writer.lock();
        let cutoff = now - min_age_secs;
        let changed = writer.execute(
            "DELETE FROM memories WHERE decay_factor < ?1 AND updated_at <= ?2",
            params![decay_threshold, cutoff],
        )?;
        Ok(changed as u64)
    }

    /// Delete rows older than `retention_days` with
    /// `importance_score < importance_floor` (spec §4.8 retention purge;
    /// never deletes `importance_score >= importance_floor` regardless
    /// of age, spec §8).
    pub fn purge_retention(&self, cutoff_created_at: i64, importance_floor: f32) -> Result<u64> {
        let writer = self.writer.lock();
        let ids: Vec<String> = {
            let mut stmt = writer.prepare(
                "SELECT id FROM memories WHERE created_at < ?1 AND importance_score < ?2",
            )?;
            let rows = stmt.query_map(params![cutoff_created_at, importance_floor], |r| r.get(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM memories WHERE id IN ({placeholders})");
        let params_dyn: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let changed = writer.execute(&sql, params_dyn.as_slice())?;

        let decay_sql = format!("DELETE FROM decay_log WHERE memory_id IN ({placeholders})");
        writer.execute(&decay_sql, params_dyn.as_slice())?;

        Ok(changed as u64)
    }

    /// Purge decay-log rows older than `cutoff` independent of their
    /// memory's retention status (spec §4.8: "purge decay log ... by
    /// same horizon").
    pub fn purge_decay_log_older_than(&self, cutoff: i64) -> Result<u64> {
        let writer = self.writer.lock();
        let changed = writer.execute("DELETE FROM decay_log WHERE created_at < ?1", params![cutoff])?;
        Ok(changed as u64)
    }

    // ---- clusters ----

    pub fn list_clusters_for_user(&self, user_id: &str) -> Result<Vec<crate::model::Cluster>> {
        let reader = self.reader.lock();
        let mut stmt = reader.prepare("SELECT * FROM clusters WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            let centroid_blob: Vec<u8> = row.get("centroid")?;
            let keywords_json: String = row.get("keywords")?;
            Ok(crate::model::Cluster {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                centroid: unpack_vector(&centroid_blob).unwrap_or_default(),
                keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
                member_count: row.get::<_, i64>("member_count")? as u64,
                avg_importance: row.get("avg_importance")?,
                last_updated: row.get("last_updated")?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn upsert_cluster(&self, cluster: &crate::model::Cluster) -> Result<()> {
        let writer = self.writer.lock();
        let keywords_json = serde_json::to_string(&cluster.keywords).unwrap_or_else(|_| "[]".into());
        writer.execute(
            "INSERT INTO clusters (id, user_id, centroid, keywords, member_count, avg_importance, last_updated)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(id) DO UPDATE SET
                centroid = excluded.centroid,
                keywords = excluded.keywords,
                member_count = excluded.member_count,
                avg_importance = excluded.avg_importance,
                last_updated = excluded.last_updated",
            params![
                cluster.id,
                cluster.user_id,
                pack_vector(&cluster.centroid),
                keywords_json,
                cluster.member_count as i64,
                cluster.avg_importance,
                cluster.last_updated
            ],
        )?;
        Ok(())
    }

    pub fn delete_cluster(&self, id: &str) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute("DELETE FROM clusters WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- emotional evolution ----

    pub fn append_emotional_point(&self, point: &crate::model::EmotionalEvolutionPoint) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "INSERT INTO emotional_evolution (user_id, character_id, valence, arousal, dominance, confidence, delta, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                point.user_id,
                point.character_id,
                point.valence,
                point.arousal,
                point.dominance,
                point.confidence,
                point.delta,
                point.created_at
            ],
        )?;
        Ok(())
    }

    // ---- GDPR / security (C9 entry points the security layer calls) ----

    /// Delete every row owned by `user_id` across the tables named in
    /// spec §4.9, and record an audit entry. Returns total rows deleted.
    pub fn delete_user_data(&self, user_id: &str, now: i64) -> Result<u64> {
        let writer = self.writer.lock();
        let memories = writer.execute("DELETE FROM memories WHERE user_id = ?1", params![user_id])?;
        let clusters = writer.execute("DELETE FROM clusters WHERE user_id = ?1", params![user_id])?;
        let relationships = writer.execute(
            "DELETE FROM relationships WHERE user_id = ?1",
            params![user_id],
        )?;
        let emotional = writer.execute(
            "DELETE FROM emotional_evolution WHERE user_id = ?1",
            params![user_id],
        )?;
        let total = memories + clusters + relationships + emotional;
        writer.execute(
            "INSERT INTO audit_log (user_id, action, row_count, created_at) VALUES (?1, 'DATA_DELETION', ?2, ?3)",
            params![user_id, total as i64, now],
        )?;
        Ok(total as u64)
    }

    pub fn rewrite_user_id(&self, old_user_id: &str, new_user_id: &str, now: i64) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute(
            "UPDATE memories SET user_id = ?2 WHERE user_id = ?1",
            params![old_user_id, new_user_id],
        )?;
        writer.execute(
            "UPDATE clusters SET user_id = ?2 WHERE user_id = ?1",
            params![old_user_id, new_user_id],
        )?;
        writer.execute(
            "INSERT INTO audit_log (user_id, action, row_count, created_at) VALUES (?1, 'ANONYMIZE', 0, ?2)",
            params![new_user_id, now],
        )?;
        Ok(())
    }

    // ---- maintenance hooks (spec §4.4) ----

    pub fn analyze(&self) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute_batch("ANALYZE;")?;
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        let writer = self.writer.lock();
        writer.execute_batch("VACUUM;")?;
        Ok(())
    }

    pub fn file_size_bytes(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn reader_connection(&self) -> &Mutex<Connection> {
        &self.reader
    }

    /// Number of `decay_log` rows recorded for `memory_id` (tests and
    /// the `memory-cli stats` surface — spec §8: "a decay-log entry
    /// exists").
    pub fn count_decay_log_for_memory(&self, memory_id: &str) -> Result<u64> {
        let reader = self.reader.lock();
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM decay_log WHERE memory_id = ?1",
            params![memory_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of `audit_log` rows for `user_id` with the given `action`
    /// (spec §8: "audit log contains a `DATA_DELETION` entry").
    pub fn count_audit_log(&self, user_id: &str, action: &str) -> Result<u64> {
        let reader = self.reader.lock();
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE user_id = ?1 AND action = ?2",
            params![user_id, action],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }
}
