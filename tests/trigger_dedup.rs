//! P4 (at-most-once trigger firing): exercises `triggers_repo::try_claim_fire_id`
//! directly against a real database, since the in-memory unit test in
//! `scheduler::tests` can only check the pure set-membership logic, not the
//! atomic INSERT ... ON CONFLICT this property actually depends on.

use neo_oracle_platform::db::triggers_repo;
use neo_oracle_platform::models::TriggerId;
use uuid::Uuid;

#[sqlx::test]
async fn duplicate_fire_id_is_claimed_once(pool: sqlx::PgPool) {
    let trigger_id = TriggerId(Uuid::new_v4());
    let fire_id = "fixed-fire-id";

    let first = triggers_repo::try_claim_fire_id(&pool, fire_id, trigger_id)
        .await
        .unwrap();
    let second = triggers_repo::try_claim_fire_id(&pool, fire_id, trigger_id)
        .await
        .unwrap();

    assert!(first, "first claim of a fresh fire_id must succeed");
    assert!(!second, "re-claiming the same fire_id must be rejected");
}

#[sqlx::test]
async fn distinct_fire_ids_are_independent(pool: sqlx::PgPool) {
    let trigger_id = TriggerId(Uuid::new_v4());

    assert!(triggers_repo::try_claim_fire_id(&pool, "a", trigger_id)
        .await
        .unwrap());
    assert!(triggers_repo::try_claim_fire_id(&pool, "b", trigger_id)
        .await
        .unwrap());
}

#[sqlx::test]
async fn sweep_removes_only_expired_rows(pool: sqlx::PgPool) {
    let trigger_id = TriggerId(Uuid::new_v4());
    triggers_repo::try_claim_fire_id(&pool, "fresh", trigger_id)
        .await
        .unwrap();

    // A fresh row is inside the 24h TTL window, so the sweep must not touch it.
    let swept = triggers_repo::sweep_expired_fire_ids(&pool).await.unwrap();
    assert_eq!(swept, 0);

    let still_claimed = triggers_repo::try_claim_fire_id(&pool, "fresh", trigger_id)
        .await
        .unwrap();
    assert!(!still_claimed, "sweep must not have evicted an unexpired fire_id");
}
