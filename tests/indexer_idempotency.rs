//! P8 (event-indexer idempotency): replaying the same block range twice
//! must produce the same set of `BlockchainEvent`s, deduplicated on
//! `(tx_hash, log_index)` -- spec §4.7/§8.

use chrono::Utc;
use neo_oracle_platform::bus::ChainEventBus;
use neo_oracle_platform::chain::{BlockHeader, FakeChainClient, LogRecord, TxReceipt};
use neo_oracle_platform::db::events_repo;
use neo_oracle_platform::indexer::Indexer;
use std::sync::Arc;

fn seed_chain() -> Arc<FakeChainClient> {
    let chain = Arc::new(FakeChainClient::new());
    let now = Utc::now();

    chain.push_block(BlockHeader {
        height: 0,
        hash: "0xblock0".to_string(),
        time: now,
        tx_hashes: vec!["0xtx0".to_string()],
    });
    chain.set_receipt(
        "0xtx0",
        TxReceipt {
            tx_hash: "0xtx0".to_string(),
            block_height: Some(0),
            vm_state: "HALT".to_string(),
            gas_consumed: 1_000_000,
            reverted: false,
            notifications: vec![LogRecord {
                contract: "0xcontractA".to_string(),
                event_name: "Transfer".to_string(),
                parameters: serde_json::json!({"from": "a", "to": "b", "amount": 10}),
                tx_hash: "0xtx0".to_string(),
                log_index: 0,
                block_height: 0,
                block_hash: "0xblock0".to_string(),
                timestamp: now,
            }],
        },
    );
    chain
}

#[sqlx::test]
async fn replaying_the_same_block_range_does_not_duplicate_events(pool: sqlx::PgPool) {
    let chain = seed_chain();
    let bus = ChainEventBus::new();
    let indexer = Indexer::new(pool.clone(), chain.clone(), bus.clone(), "unit-test-net".to_string());

    indexer.process_available_blocks().await.unwrap();
    let after_first = events_repo::list_in_range(&pool, 0, 0).await.unwrap();
    assert_eq!(after_first.len(), 1, "one notification in the seeded block");

    // Simulate a crash-restart: reset the cursor back before the block and
    // reprocess it. The `(tx_hash, log_index)` conflict target must keep
    // the event set identical.
    sqlx::query("UPDATE indexer_cursors SET last_processed_block = -1 WHERE network = $1")
        .bind("unit-test-net")
        .execute(&pool)
        .await
        .unwrap();

    indexer.process_available_blocks().await.unwrap();
    let after_replay = events_repo::list_in_range(&pool, 0, 0).await.unwrap();

    assert_eq!(after_replay.len(), 1, "replay must not create a duplicate row");
    assert_eq!(after_first[0].id.0, after_replay[0].id.0, "the original row survives untouched");
}
