//! P5 (secret scoping) and P6 (enclave resource/capability bounds), spec §8.
//!
//! P5 is checked against the real vault (`SecretStore` + Postgres): a
//! function that declares only one of two stored secrets must come back
//! with exactly that one, and only that one leaves an access-audit row.
//! P6 is checked against `MockEnclaveRuntime`, the same double the module
//! tests use, driven here through the `EnclaveRuntime` trait object the
//! rest of the platform calls it through.

use std::sync::Arc;

use neo_oracle_platform::db::secrets_repo;
use neo_oracle_platform::enclave::mock::MockEnclaveRuntime;
use neo_oracle_platform::enclave::{EnclaveOutcome, EnclaveRequest, EnclaveRuntime};
use neo_oracle_platform::models::UserId;
use neo_oracle_platform::secrets::SecretStore;
use sqlx::Row;
use uuid::Uuid;

fn request(source: &str) -> EnclaveRequest {
    EnclaveRequest {
        source: source.to_string(),
        params_json: serde_json::json!({}),
        secrets_map: Default::default(),
        deadline_ms: 5000,
        memory_limit_mb: 64,
    }
}

#[sqlx::test]
async fn load_for_execution_only_returns_declared_secrets(pool: sqlx::PgPool) {
    let store = SecretStore::new(pool.clone(), [7u8; 32]);
    store.rotate_data_key().await.unwrap();

    let owner = UserId(Uuid::new_v4());
    store.put(owner, "api_key", b"declared-value", None).await.unwrap();
    store.put(owner, "other_key", b"undeclared-value", None).await.unwrap();

    let execution_id = Uuid::new_v4();
    let loaded = store
        .load_for_execution(owner, &["api_key".to_string()], execution_id)
        .await
        .unwrap();

    assert_eq!(loaded.len(), 1, "P5: a function's enclave call may only see secrets it declared");
    assert_eq!(loaded.get("api_key").unwrap(), "declared-value");
    assert!(loaded.get("other_key").is_none());

    let audited = secrets_repo::list_for_owner(&pool, owner).await.unwrap();
    let api_key_secret = audited.iter().find(|s| s.name == "api_key").unwrap();

    let rows = sqlx::query("SELECT secret_id FROM secret_access_audit WHERE owner = $1")
        .bind(owner.0)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "only the declared secret's read is audited");
    let audited_id: Uuid = rows[0].try_get("secret_id").unwrap();
    assert_eq!(audited_id, api_key_secret.id.0);
}

#[sqlx::test]
async fn unreferenced_secret_name_is_simply_absent(pool: sqlx::PgPool) {
    let store = SecretStore::new(pool.clone(), [3u8; 32]);
    store.rotate_data_key().await.unwrap();
    let owner = UserId(Uuid::new_v4());
    store.put(owner, "present", b"x", None).await.unwrap();

    let loaded = store
        .load_for_execution(owner, &["present".to_string(), "never_stored".to_string()], Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(loaded.len(), 1, "a declared-but-never-stored name must not error, just be missing");
}

#[tokio::test]
async fn enclave_enforces_timeout_memory_and_sandbox_bounds() {
    let enclave: Arc<dyn EnclaveRuntime> = Arc::new(MockEnclaveRuntime);

    let timeout = enclave.run(Uuid::new_v4(), request("sleep")).await;
    assert_eq!(timeout.status, EnclaveOutcome::Timeout, "P6: deadline_ms must bound wall-clock execution");

    let oom = enclave.run(Uuid::new_v4(), request("allocate")).await;
    assert_eq!(oom.status, EnclaveOutcome::MemoryExceeded, "P6: memory_limit_mb must bound peak RSS");

    let violation = enclave.run(Uuid::new_v4(), request("touch fs")).await;
    assert_eq!(violation.status, EnclaveOutcome::SandboxViolation, "P6: unlisted capabilities must be denied");

    let ok = enclave.run(Uuid::new_v4(), request(r#"return {"done":true}"#)).await;
    assert_eq!(ok.status, EnclaveOutcome::Success);
    assert_eq!(ok.result_json.unwrap(), serde_json::json!({"done": true}));
}
