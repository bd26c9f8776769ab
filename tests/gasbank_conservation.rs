//! P2 (gas ledger conservation), property-style: for any sequence of
//! allocate/capture/refund operations against a single deposit, the
//! invariant `available + reserved + sum(captures) == sum(deposits)`
//! (spec §4.6 I1/I2) must hold after every step. `tests/gasbank_ledger.rs`
//! checks this against S3's fixed numbers; this sweeps randomized
//! sequences instead.
//!
//! Each generated case runs against the pool inside `futures::executor::
//! block_on` -- `#[sqlx::test]` already drives the surrounding fn on a
//! tokio runtime, so a case can't spin up its own nested runtime, but
//! `block_on` just polls the future on the current thread without that
//! conflict.

use neo_oracle_platform::db::{gasbank_repo, transactions_repo, users_repo};
use neo_oracle_platform::models::transaction::{Transaction, TxId, TxStatus, TxType};
use neo_oracle_platform::models::{User, UserId};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};
use uuid::Uuid;

async fn seed_user(pool: &sqlx::PgPool) -> UserId {
    let user = User {
        id: UserId(Uuid::new_v4()),
        email: format!("{}@example.test", Uuid::new_v4()),
        roles: vec![],
        created_at: chrono::Utc::now(),
        quotas: serde_json::json!({}),
    };
    users_repo::create(pool, &user).await.unwrap();
    user.id
}

async fn seed_tx(pool: &sqlx::PgPool, owner: UserId) -> TxId {
    let now = chrono::Utc::now();
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

/// One allocate, then either a capture at some fraction of the reserved
/// amount or a full refund.
#[derive(Debug, Clone, Copy)]
struct Op {
    allocate_amount: i64,
    capture_fraction_permille: i64,
    refund_instead: bool,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (1i64..=1_000, 0i64..=1000, any::<bool>()).prop_map(|(allocate_amount, capture_fraction_permille, refund_instead)| Op {
        allocate_amount,
        capture_fraction_permille,
        refund_instead,
    })
}

async fn run_case(pool: &sqlx::PgPool, deposit: i64, ops: Vec<Op>) {
    let owner = seed_user(pool).await;
    gasbank_repo::deposit(pool, owner, deposit, "0xdeposit").await.unwrap();

    let mut total_captured: i64 = 0;

    for op in ops {
        let tx_id = seed_tx(pool, owner).await;
        let Ok(allocation_id) = gasbank_repo::allocate(pool, owner, tx_id, op.allocate_amount).await else {
            // Insufficient available balance: the op is a no-op, the
            // rejection itself is covered by `gasbank_ledger.rs`.
            continue;
        };

        if op.refund_instead {
            gasbank_repo::refund(pool, allocation_id).await.unwrap();
        } else {
            let actual = op.allocate_amount * op.capture_fraction_permille / 1000;
            gasbank_repo::capture(pool, allocation_id, actual).await.unwrap();
            total_captured += actual;
        }

        let account = gasbank_repo::get_account(pool, owner).await.unwrap();
        assert!(account.available >= 0, "I1: available must never go negative");
        assert!(account.reserved >= 0, "reserved must never go negative");
        assert_eq!(
            account.available + account.reserved + total_captured,
            deposit,
            "I2: available + reserved + captured must conserve the deposit at every step"
        );
    }
}

#[sqlx::test]
async fn ledger_conserves_balance_under_randomized_operation_sequences(pool: sqlx::PgPool) {
    let mut runner = TestRunner::new(Config::with_cases(32));
    let strategy = (1i64..=1_000_000, proptest::collection::vec(op_strategy(), 0..8));

    runner
        .run(&strategy, |(deposit, ops)| {
            futures::executor::block_on(run_case(&pool, deposit, ops));
            Ok(())
        })
        .unwrap();
}
