//! `/subscriptions` (spec §6): event subscription CRUD.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::subscriptions_repo;
use crate::error::AppResult;
use crate::models::{EventSubscription, SubscriptionId, SubscriptionType};

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).delete(remove))
}

#[derive(Deserialize)]
struct CreateRequest {
    contract_address: String,
    event_name: String,
    #[serde(default = "default_parameter_tree")]
    parameter_tree: serde_json::Value,
    #[serde(default)]
    start_block: Option<u64>,
    #[serde(default)]
    end_block: Option<u64>,
    subscription_type: SubscriptionType,
    #[serde(default)]
    webhook_url: Option<String>,
}

fn default_parameter_tree() -> serde_json::Value {
    serde_json::Value::String("*".to_string())
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let subs = subscriptions_repo::list_for_owner(&state.pool, user.id).await?;
    Ok(ok(subs))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateRequest>,
) -> AppResult<axum::response::Response> {
    if req.subscription_type == SubscriptionType::Webhook && req.webhook_url.is_none() {
        return Err(crate::error::AppError::new(
            crate::error::ErrorCode::InvalidParameter,
            "webhook_url is required for webhook subscriptions",
        ));
    }

    let subscription = EventSubscription {
        id: SubscriptionId(Uuid::new_v4()),
        owner: user.id,
        contract_address: req.contract_address,
        event_name: req.event_name,
        parameter_tree: req.parameter_tree,
        start_block: req.start_block,
        end_block: req.end_block,
        subscription_type: req.subscription_type,
        webhook_url: req.webhook_url,
        last_triggered_at: None,
        trigger_count: 0,
        active: true,
    };
    subscriptions_repo::create(&state.pool, &subscription).await?;
    Ok(super::created(subscription))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let subscription = subscriptions_repo::get(&state.pool, SubscriptionId(id)).await?;
    Ok(ok(subscription))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    subscriptions_repo::delete(&state.pool, SubscriptionId(id)).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
