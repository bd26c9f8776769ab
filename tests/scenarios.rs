//! Seed scenarios S1/S2 (spec §8), driven end-to-end through
//! `Coordinator::handle` against `MockEnclaveRuntime`. S3, S4, S5 and S6
//! are each already exercised at the layer that actually carries their
//! property -- `tests/gasbank_ledger.rs`, `tests/webhook_delivery.rs`,
//! `tests/pricefeed_publish.rs` and `tests/scheduler_dedup.rs` /
//! `tests/indexer_idempotency.rs` respectively -- so they aren't repeated
//! here.

use std::sync::Arc;

use chrono::Utc;
use neo_oracle_platform::bus::{TriggerEventBus, TxEventBus};
use neo_oracle_platform::chain::FakeChainClient;
use neo_oracle_platform::coordinator::{Coordinator, CoordinatorConfig};
use neo_oracle_platform::db::{executions_repo, functions_repo, triggers_repo, users_repo};
use neo_oracle_platform::enclave::mock::MockEnclaveRuntime;
use neo_oracle_platform::gasbank::GasBankLedger;
use neo_oracle_platform::models::execution::{ExecutionStatus, TriggerEventStatus};
use neo_oracle_platform::models::{Function, FunctionId, Trigger, TriggerConfig, TriggerId, TriggerStatus, User, UserId};
use neo_oracle_platform::scheduler::InvocationEvent;
use neo_oracle_platform::secrets::SecretStore;
use neo_oracle_platform::tx::manager::TransactionManager;
use neo_oracle_platform::wallet::WalletStore;
use sqlx::Row;
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

async fn seed_function(pool: &sqlx::PgPool, owner: UserId, source: &str) -> FunctionId {
    let now = Utc::now();
    let function = Function {
        id: FunctionId(Uuid::new_v4()),
        owner,
        name: format!("fn-{}", Uuid::new_v4()),
        source: source.to_string(),
        secret_refs: vec![],
        created_at: now,
        updated_at: now,
    };
    functions_repo::create(pool, &function).await.unwrap();
    function.id
}

async fn seed_trigger(pool: &sqlx::PgPool, owner: UserId, function_id: FunctionId) -> TriggerId {
    let trigger = Trigger {
        id: TriggerId(Uuid::new_v4()),
        owner,
        function_id,
        config: TriggerConfig::Cron { schedule: "*/5 * * * * *".to_string() },
        status: TriggerStatus::Active,
        created_at: Utc::now(),
    };
    triggers_repo::create(pool, &trigger).await.unwrap();
    trigger.id
}

fn build_coordinator(pool: sqlx::PgPool, memory_limit_mb: u64) -> Arc<Coordinator> {
    let chain = Arc::new(FakeChainClient::new());
    let secrets = Arc::new(SecretStore::new(pool.clone(), [1u8; 32]));
    let wallet = Arc::new(WalletStore::new(pool.clone(), [2u8; 32]));
    let tx_manager = Arc::new(TransactionManager::new(pool.clone(), chain, TxEventBus::new()));
    let gasbank = Arc::new(GasBankLedger::new(pool.clone()));
    Coordinator::new(
        pool,
        secrets,
        Arc::new(MockEnclaveRuntime),
        wallet,
        tx_manager,
        gasbank,
        TriggerEventBus::new(),
        CoordinatorConfig { exec_timeout_ms: 5_000, memory_limit_mb },
    )
}

#[sqlx::test]
async fn s1_cron_function_success(pool: sqlx::PgPool) {
    let owner = seed_user(&pool).await;
    let function_id = seed_function(&pool, owner, r#"return {"sum": 3}"#).await;
    let trigger_id = seed_trigger(&pool, owner, function_id).await;
    let coordinator = build_coordinator(pool.clone(), 128);

    coordinator
        .handle(InvocationEvent {
            trigger_id,
            function_id,
            owner,
            fire_id: "s1-fire".to_string(),
            fired_at: Utc::now(),
            params: serde_json::json!({"a": 1, "b": 2}),
        })
        .await;

    let executions = executions_repo::list_for_function(&pool, function_id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Success);
    assert_eq!(executions[0].result_json, Some(serde_json::json!({"sum": 3})));

    let history = triggers_repo::history(&pool, trigger_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TriggerEventStatus::Success);
}

#[sqlx::test]
async fn s2_memory_exceeded_execution(pool: sqlx::PgPool) {
    let owner = seed_user(&pool).await;
    let function_id = seed_function(&pool, owner, "allocate").await;
    let trigger_id = seed_trigger(&pool, owner, function_id).await;
    let coordinator = build_coordinator(pool.clone(), 128);

    coordinator
        .handle(InvocationEvent {
            trigger_id,
            function_id,
            owner,
            fire_id: "s2-fire".to_string(),
            fired_at: Utc::now(),
            params: serde_json::json!({}),
        })
        .await;

    let executions = executions_repo::list_for_function(&pool, function_id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::MemoryExceeded);

    let tx_row = sqlx::query("SELECT COUNT(*) AS n FROM transactions")
        .fetch_one(&pool)
        .await
        .unwrap();
    let tx_count: i64 = tx_row.try_get("n").unwrap();
    assert_eq!(tx_count, 0, "a memory-exceeded execution must never submit a transaction");

    let history = triggers_repo::history(&pool, trigger_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TriggerEventStatus::Error);
}
