//! P2 (gas ledger conservation) and P3 (allocation termination), driven
//! against a real database through `db::gasbank_repo`'s SERIALIZABLE
//! transactions -- scenario S3's numbers exactly (deposit 10.0, allocate
//! 0.5, capture 0.4 of actual gas consumed, expect available 9.6/reserved 0).
//! Amounts are integer "drops" here (spec §3 doesn't fix a gas unit scale).

use chrono::Utc;
use neo_oracle_platform::db::{gasbank_repo, transactions_repo, users_repo};
use neo_oracle_platform::models::transaction::{Transaction, TxId, TxStatus, TxType};
use neo_oracle_platform::models::{User, UserId};
use uuid::Uuid;

async fn seed_user(pool: &sqlx::PgPool) -> UserId {
    let user = User {
        id: UserId(Uuid::new_v4()),
        email: format!("{}@example.test", Uuid::new_v4()),
        roles: vec![],
        created_at: Utc::now(),
        quotas: serde_json::json!({}),
    };
    users_repo::create(pool, &user).await.unwrap();
    user.id
}

async fn seed_tx(pool: &sqlx::PgPool, owner: UserId) -> TxId {
    let now = Utc::now();
    let tx = Transaction {
        id: TxId(Uuid::new_v4()),
        hash: None,
        service: "platform".to_string(),
        entity_id: Uuid::new_v4(),
        entity_type: "function".to_string(),
        status: TxStatus::Created,
        tx_type: TxType::FunctionCallback,
        payload: serde_json::json!({}),
        gas_price: 0,
        system_fee: 0,
        network_fee: 0,
        gas_consumed: None,
        block_height: None,
        block_time: None,
        sender_address: "Nplatform".to_string(),
        error: None,
        failure_reason: None,
        result: None,
        event_count: 0,
        submit_attempts: 0,
        status_updated_at: now,
        created_at: now,
    };
    transactions_repo::create(pool, &tx, Some(owner.0)).await.unwrap();
    tx.id
}

#[sqlx::test]
async fn s3_deposit_allocate_capture_conserves_balance(pool: sqlx::PgPool) {
    let user = seed_user(&pool).await;
    let tx_id = seed_tx(&pool, user).await;

    gasbank_repo::deposit(&pool, user, 1_000_000_000, "0xdeposit").await.unwrap();
    let allocation_id = gasbank_repo::allocate(&pool, user, tx_id, 50_000_000).await.unwrap();

    let mid = gasbank_repo::get_account(&pool, user).await.unwrap();
    assert_eq!(mid.available, 950_000_000);
    assert_eq!(mid.reserved, 50_000_000);

    gasbank_repo::capture(&pool, allocation_id, 40_000_000).await.unwrap();

    let final_account = gasbank_repo::get_account(&pool, user).await.unwrap();
    assert_eq!(final_account.available, 960_000_000, "S3: final available = 9.6");
    assert_eq!(final_account.reserved, 0, "S3: allocation fully resolved");
}

#[sqlx::test]
async fn allocation_cannot_be_captured_twice(pool: sqlx::PgPool) {
    let user = seed_user(&pool).await;
    let tx_id = seed_tx(&pool, user).await;

    gasbank_repo::deposit(&pool, user, 100, "0xdeposit").await.unwrap();
    let allocation_id = gasbank_repo::allocate(&pool, user, tx_id, 100).await.unwrap();

    gasbank_repo::capture(&pool, allocation_id, 100).await.unwrap();
    let second = gasbank_repo::capture(&pool, allocation_id, 100).await;
    assert!(second.is_err(), "P3: an already-resolved allocation must reject a second capture");
}

#[sqlx::test]
async fn refund_returns_the_full_reservation(pool: sqlx::PgPool) {
    let user = seed_user(&pool).await;
    let tx_id = seed_tx(&pool, user).await;

    gasbank_repo::deposit(&pool, user, 100, "0xdeposit").await.unwrap();
    let allocation_id = gasbank_repo::allocate(&pool, user, tx_id, 30).await.unwrap();
    gasbank_repo::refund(&pool, allocation_id).await.unwrap();

    let account = gasbank_repo::get_account(&pool, user).await.unwrap();
    assert_eq!(account.available, 100);
    assert_eq!(account.reserved, 0);
}

#[sqlx::test]
async fn allocate_beyond_available_is_rejected(pool: sqlx::PgPool) {
    let user = seed_user(&pool).await;
    let tx_id = seed_tx(&pool, user).await;

    gasbank_repo::deposit(&pool, user, 10, "0xdeposit").await.unwrap();
    let result = gasbank_repo::allocate(&pool, user, tx_id, 11).await;
    assert!(result.is_err(), "insufficient_gas must be surfaced, not silently clamped");

    let account = gasbank_repo::get_account(&pool, user).await.unwrap();
    assert_eq!(account.available, 10, "a rejected allocation must not move any balance (I1)");
}
