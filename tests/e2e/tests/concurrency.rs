//! Black-box concurrency scenario (spec §8 scenario 6): 50 parallel
//! ingests racing 50 parallel retrievals against one shared engine.

use std::sync::Arc;

use memory_core::clock::{Clock, FakeClock};
use memory_core::config::Config;
use memory_core::model::{IngestInput, RecallInput};
use memory_core::Engine;

fn test_config() -> Config {
    let mut config = Config::for_tests();
    config.embedding_base_url = "http://127.0.0.1:1".to_string();
    config.embedding_max_retries = 0;
    config
}

#[tokio::test]
async fn concurrent_ingests_and_recalls_stay_isolated_and_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_700_000_000));
    let engine = Arc::new(
        Engine::open_with_clock(&dir.path().join("e2e.db"), test_config(), clock)
            .await
            .unwrap(),
    );

    // Seed one memory for a different user so isolation has something
    // to violate if recall ever leaks across users under contention.
    engine
        .ingest(
            "8",
            IngestInput {
                text: "u8's private note".into(),
                character_id: None,
                conversation_id: None,
                memory_type: None,
                flagged_important: false,
            },
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();

    for i in 0..50u32 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .ingest(
                    "7",
                    IngestInput {
                        text: format!("concurrent memory number {i}"),
                        character_id: None,
                        conversation_id: None,
                        memory_type: None,
                        flagged_important: false,
                    },
                )
                .await
                .map(|_| ())
        }));
    }

    for i in 0..50u32 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .recall(
                    "7",
                    &RecallInput {
                        query: format!("concurrent memory number {i}"),
                        character_id: None,
                        k: 5,
                    },
                )
                .await
                .map(|_| ())
        }));
    }

    for task in tasks {
        task.await.expect("task panicked").expect("ingest or recall failed");
    }

    assert_eq!(engine.store().count_for_user("7").unwrap(), 50);

    let all_user_7 = engine.store().list_for_user("7").unwrap();
    assert!(all_user_7.iter().all(|m| m.user_id == "7"));

    let final_recall = engine
        .recall(
            "7",
            &RecallInput {
                query: "concurrent memory".into(),
                character_id: None,
                k: 50,
            },
        )
        .await
        .unwrap();
    assert!(final_recall.iter().all(|m| m.user_id == "7"));

    let other_user_recall = engine
        .recall(
            "8",
            &RecallInput {
                query: "concurrent memory".into(),
                character_id: None,
                k: 50,
            },
        )
        .await
        .unwrap();
    assert!(other_user_recall.iter().all(|m| m.content.contains("u8's private note")));
}
