//! FTS5 keyword search (spec §4.6.8's "BM25-style keyword score")
//!
//! Queries the `memories_fts` virtual table created by migration V1
//! (grounded on the teacher's `knowledge_fts` table and sync triggers
//! in `storage/migrations.rs`).

use crate::error::Result;
use rusqlite::Connection;

/// Run a keyword search scoped to `user_id`, returning `(memory_id,
/// score)` ranked by FTS5's `bm25()` (negated so higher is better,
/// matching the convention used everywhere else in the pipeline).
pub fn keyword_search(conn: &Connection, user_id: &str, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let fts_query = sanitize_fts_query(query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT m.id, bm25(memories_fts) AS rank
         FROM memories_fts
         JOIN memories m ON m.rowid = memories_fts.rowid
         WHERE memories_fts MATCH ?1 AND m.user_id = ?2
         ORDER BY rank
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(
        rusqlite::params![fts_query, user_id, limit as i64],
        |row| {
            let id: String = row.get(0)?;
            let bm25: f64 = row.get(1)?;
            // bm25() in SQLite's FTS5 returns a *lower-is-better* score;
            // invert so larger means more relevant, consistent with
            // cosine similarity scores elsewhere in the pipeline.
            Ok((id, -bm25 as f32))
        },
    )?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Quote each term so FTS5 treats punctuation in user content as
/// literal text rather than query syntax (defense in depth alongside
/// parameterization, spec §4.9).
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| {
            let cleaned: String = term.chars().filter(|c| *c != '"').collect();
            format!("\"{cleaned}\"")
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_quotes_each_term() {
        let sanitized = sanitize_fts_query("my name is Layne");
        assert_eq!(sanitized, "\"my\" OR \"name\" OR \"is\" OR \"Layne\"");
    }

    #[test]
    fn sanitize_strips_embedded_quotes() {
        let sanitized = sanitize_fts_query(r#"a"b"#);
        assert_eq!(sanitized, "\"ab\"");
    }

    #[test]
    fn empty_query_short_circuits() {
        let conn = Connection::open_in_memory().unwrap();
        let results = keyword_search(&conn, "u1", "   ", 10).unwrap();
        assert!(results.is_empty());
    }
}
