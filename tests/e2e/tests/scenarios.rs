//! Black-box end-to-end scenarios driven through `memory-core`'s public
//! API only (spec §8's literal scenarios 1, 2, 3, 4, 5).

use std::sync::Arc;

use memory_core::clock::{Clock, FakeClock};
use memory_core::config::Config;
use memory_core::model::{IngestInput, Memory, MemoryType, RecallInput};
use memory_core::Engine;

fn test_config() -> Config {
    let mut config = Config::for_tests();
    // No embedding service in CI: point at an unroutable address so every
    // embed call falls back deterministically, matching the embedding
    // client's own unit tests.
    config.embedding_base_url = "http://127.0.0.1:1".to_string();
    config.embedding_max_retries = 0;
    config
}

async fn open_engine(dir: &tempfile::TempDir, clock: Arc<dyn Clock>) -> Engine {
    Engine::open_with_clock(&dir.path().join("e2e.db"), test_config(), clock)
        .await
        .unwrap()
}

#[tokio::test]
async fn dedup_coalesces_and_counts_access() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
    let engine = open_engine(&dir, clock).await;

    let first = engine
        .ingest(
            "7",
            IngestInput {
                text: "my name is LAYNE".into(),
                character_id: None,
                conversation_id: None,
                memory_type: None,
                flagged_important: false,
            },
        )
        .await
        .unwrap();
    let second = engine
        .ingest(
            "7",
            IngestInput {
                text: "my name is LAYNE".into(),
                character_id: None,
                conversation_id: None,
                memory_type: None,
                flagged_important: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.access_frequency, 2);
    assert_eq!(engine.store().count_for_user("7").unwrap(), 1);
}

#[tokio::test]
async fn answer_aware_retrieval_ranks_stored_fact_first() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
    let engine = open_engine(&dir, clock).await;

    engine
        .ingest(
            "7",
            IngestInput {
                text: "my name is LAYNE".into(),
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
            "7",
            &RecallInput {
                query: "what's my name?".into(),
                character_id: None,
                k: 3,
            },
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results[0].content.contains("LAYNE"));
}

#[tokio::test]
async fn cross_user_isolation_hides_other_users_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
    let engine = open_engine(&dir, clock).await;

    engine
        .ingest(
            "7",
            IngestInput {
                text: "secret code 42".into(),
                character_id: None,
                conversation_id: None,
                memory_type: None,
                flagged_important: false,
            },
        )
        .await
        .unwrap();

    let results = engine
        .recall(
            "8",
            &RecallInput {
                query: "secret code 42".into(),
                character_id: None,
                k: 10,
            },
        )
        .await
        .unwrap();
    assert!(results.is_empty());

    // The row physically exists under u=7, but u=8's derived key can't
    // decrypt it (spec §8: "encrypted bytes ... undecryptable with u=8's
    // derived key").
    let stored = engine.store().list_for_user("7").unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn decay_sweep_reduces_old_memory_and_logs_it() {
    let dir = tempfile::tempdir().unwrap();
    let now = 1_700_000_000;
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(now));
    let engine = open_engine(&dir, clock).await;

    let backdated = Memory {
        id: "m-old".into(),
        user_id: "7".into(),
        character_id: None,
        conversation_id: None,
        content: "an old memory".into(),
        content_hash: "old-hash".into(),
        embedding: vec![0.05; memory_core::config::EMBEDDING_DIMS],
        importance_score: 0.4,
        emotional_weight: 0.1,
        decay_factor: 1.0,
        access_frequency: 0,
        semantic_cluster_id: None,
        memory_type: MemoryType::Fact,
        cross_character_shared: false,
        created_at: now - 120 * 86_400,
        updated_at: now - 120 * 86_400,
        last_accessed: now - 120 * 86_400,
        encryption_metadata: None,
    };
    engine.store().insert_memory(&backdated).unwrap();

    engine.run_maintenance().unwrap();

    let updated = engine.store().get_memory("7", "m-old").unwrap().unwrap();
    assert!(updated.decay_factor <= 0.125 + 0.01);
    assert!(updated.decay_factor < 1.0);
    assert_eq!(engine.store().count_decay_log_for_memory("m-old").unwrap(), 1);
}

#[tokio::test]
async fn gdpr_delete_clears_storage_and_audits() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
    let engine = open_engine(&dir, clock).await;

    engine
        .ingest(
            "7",
            IngestInput {
                text: "my name is LAYNE".into(),
                character_id: None,
                conversation_id: None,
                memory_type: None,
                flagged_important: false,
            },
        )
        .await
        .unwrap();

    let deleted = engine.gdpr_delete("7").unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(engine.store().count_for_user("7").unwrap(), 0);

    let results = engine
        .recall(
            "7",
            &RecallInput {
                query: "my name".into(),
                character_id: None,
                k: 10,
            },
        )
        .await
        .unwrap();
    assert!(results.is_empty());

    assert_eq!(engine.store().count_audit_log("7", "DATA_DELETION").unwrap(), 1);
}
