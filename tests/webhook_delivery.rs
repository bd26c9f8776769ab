//! P7 (webhook delivery retry/backoff), spec §4.8/§8: a subscriber
//! endpoint that returns 503 twice and 200 on the third attempt must end
//! up `delivered` with `attempts == 3`, driven through
//! `WebhookDeliveryWorker::attempt_delivery` directly rather than waiting
//! on the real `RETRY_BACKOFF` schedule.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use neo_oracle_platform::db::{events_repo, subscriptions_repo, users_repo};
use neo_oracle_platform::models::{
    BlockchainEvent, BlockchainEventId, BlockchainEventState, EventNotification, EventSubscription,
    NotificationStatus, SubscriptionId, SubscriptionType, User, UserId,
};
use neo_oracle_platform::subscriptions::delivery::WebhookDeliveryWorker;
use uuid::Uuid;

async fn flaky_then_ok(State(counter): State<Arc<AtomicU32>>) -> StatusCode {
    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt < 3 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn spawn_flaky_server() -> (String, Arc<AtomicU32>) {
    let counter = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/hook", post(flaky_then_ok))
        .with_state(counter.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), counter)
}

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

#[sqlx::test]
async fn retries_twice_then_delivers(pool: sqlx::PgPool) {
    let (webhook_url, _counter) = spawn_flaky_server().await;
    let owner = seed_user(&pool).await;

    let event = BlockchainEvent {
        id: BlockchainEventId(Uuid::new_v4()),
        contract: "0xcontract".to_string(),
        event_name: "Transfer".to_string(),
        parameters: serde_json::json!({}),
        tx_hash: "0xtx".to_string(),
        log_index: 0,
        block_number: 1,
        block_hash: "0xblock1".to_string(),
        timestamp: Utc::now(),
        state: BlockchainEventState::Confirmed,
    };
    events_repo::write_block_events(&pool, "unit-test-net", 1, std::slice::from_ref(&event))
        .await
        .unwrap();

    let subscription = EventSubscription {
        id: SubscriptionId(Uuid::new_v4()),
        owner,
        contract_address: event.contract.clone(),
        event_name: event.event_name.clone(),
        parameter_tree: serde_json::json!({}),
        start_block: None,
        end_block: None,
        subscription_type: SubscriptionType::Webhook,
        webhook_url: Some(webhook_url),
        last_triggered_at: None,
        trigger_count: 0,
        active: true,
    };
    subscriptions_repo::create(&pool, &subscription).await.unwrap();
    let notification_id = subscriptions_repo::create_notification(&pool, subscription.id, event.id.0)
        .await
        .unwrap();

    let worker = WebhookDeliveryWorker::new(pool.clone());

    // `attempt_delivery` is driven directly (rather than through
    // `list_deliverable`, which is gated on `next_attempt_at`) so the test
    // doesn't have to sleep through the real `RETRY_BACKOFF` schedule.
    let make_notification = |attempts: u32| EventNotification {
        id: notification_id,
        subscription_id: subscription.id,
        event_id: event.id.0,
        status: NotificationStatus::Pending,
        attempts,
        last_attempt_at: None,
        next_attempt_at: None,
        last_response_status: None,
        created_at: Utc::now(),
    };

    worker.attempt_delivery(make_notification(0)).await.unwrap();
    worker.attempt_delivery(make_notification(1)).await.unwrap();
    worker.attempt_delivery(make_notification(2)).await.unwrap();

    let final_row = subscriptions_repo::list_for_owner(&pool, owner).await.unwrap();
    assert_eq!(final_row.len(), 1, "sanity: the subscription survives delivery");

    let deliverable = subscriptions_repo::list_deliverable(&pool).await.unwrap();
    assert!(
        deliverable.iter().all(|n| n.id != notification_id),
        "P7: after a 503/503/200 sequence the notification must be terminal (delivered), not retrying"
    );
}
