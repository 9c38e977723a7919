//! Schema migrations
//!
//! Versioned, idempotent SQL applied once at startup. A
//! `schema_version` table records the highest version applied; each
//! migration's `up` SQL is replayed through `execute_batch` so
//! multi-statement bodies (tables, indexes, triggers) apply together.

/// A single forward migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// Every migration, in order. V1 lays down the full spec §3 schema;
/// later versions are additive tuning passes.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, clusters, relationships, emotional evolution, decay log",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Performance: WAL page size bump via VACUUM",
        up: MIGRATION_V2_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_id TEXT,
    conversation_id TEXT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding BLOB NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    emotional_weight REAL NOT NULL DEFAULT 0.0,
    decay_factor REAL NOT NULL DEFAULT 1.0,
    access_frequency INTEGER NOT NULL DEFAULT 0,
    semantic_cluster_id TEXT,
    memory_type TEXT NOT NULL DEFAULT 'conversation',
    cross_character_shared INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL,
    encryption_algorithm TEXT,
    encryption_iv TEXT,
    encryption_auth_tag TEXT,
    UNIQUE (user_id, content_hash),
    FOREIGN KEY (semantic_cluster_id) REFERENCES clusters(id)
);

CREATE INDEX IF NOT EXISTS idx_memories_recall
    ON memories(user_id, character_id, importance_score DESC, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_decay
    ON memories(decay_factor, last_accessed, importance_score);
CREATE INDEX IF NOT EXISTS idx_memories_emotional
    ON memories(character_id, user_id, emotional_weight DESC, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_content_hash ON memories(content_hash);
CREATE INDEX IF NOT EXISTS idx_memories_conversation ON memories(conversation_id);

CREATE TABLE IF NOT EXISTS clusters (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    centroid BLOB NOT NULL,
    keywords TEXT NOT NULL DEFAULT '[]',
    member_count INTEGER NOT NULL DEFAULT 0,
    avg_importance REAL NOT NULL DEFAULT 0.0,
    last_updated INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_clusters_user ON clusters(user_id);

CREATE TABLE IF NOT EXISTS relationships (
    user_id TEXT NOT NULL,
    character_a TEXT NOT NULL,
    character_b TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.0,
    shared_memory_ids TEXT NOT NULL DEFAULT '[]',
    interaction_count INTEGER NOT NULL DEFAULT 0,
    last_interaction INTEGER NOT NULL,
    PRIMARY KEY (user_id, character_a, character_b)
);

CREATE TABLE IF NOT EXISTS emotional_evolution (
    user_id TEXT NOT NULL,
    character_id TEXT NOT NULL,
    valence REAL NOT NULL,
    arousal REAL NOT NULL,
    dominance REAL NOT NULL,
    confidence REAL NOT NULL,
    delta REAL NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_emotional_user_character
    ON emotional_evolution(user_id, character_id, created_at DESC);

CREATE TABLE IF NOT EXISTS decay_log (
    memory_id TEXT NOT NULL,
    original_importance REAL NOT NULL,
    decayed_importance REAL NOT NULL,
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decay_log_memory ON decay_log(memory_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    row_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    content,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
    INSERT INTO memories_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
END;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, strftime('%s','now'));
"#;

const MIGRATION_V2_UP: &str = r#"
UPDATE schema_version SET version = 2, applied_at = strftime('%s','now');
"#;

/// Highest applied version, `0` on a fresh database.
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .or(Ok(0))
}

/// Apply every migration newer than the current version. `V2` runs a
/// `page_size` bump via `VACUUM`, which cannot execute inside
/// `execute_batch`'s implicit transaction (spec §4.4's vacuum hook).
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(version = migration.version, description = migration.description, "applying migration");
            conn.execute_batch(migration.up)?;

            if migration.version == 2 {
                conn.pragma_update(None, "page_size", 8192)?;
                conn.execute_batch("VACUUM;")?;
            }

            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_database_applies_all_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), 0);
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);
        assert_eq!(get_current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied_again = apply_migrations(&conn).unwrap();
        assert_eq!(applied_again, 0);
    }

    #[test]
    fn memories_table_exists_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
