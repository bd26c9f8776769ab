//! `/triggers` (spec §6): CRUD, manual fire, and firing history.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::triggers_repo;
use crate::error::AppResult;
use crate::models::{Trigger, TriggerConfig, TriggerId, TriggerStatus};
use crate::scheduler::validate_cron_schedule;

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).delete(remove))
        .route("/:id/execute", post(fire))
        .route("/:id/history", get(history))
}

#[derive(Deserialize)]
struct CreateRequest {
    function_id: Uuid,
    config: TriggerConfig,
}

async fn list(State(state): State<AppState>, AuthUser(_user): AuthUser) -> AppResult<axum::response::Response> {
    let triggers = triggers_repo::list_active(&state.pool).await?;
    Ok(ok(triggers))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateRequest>,
) -> AppResult<axum::response::Response> {
    if let TriggerConfig::Cron { schedule } = &req.config {
        validate_cron_schedule(schedule)
            .map_err(|e| crate::error::AppError::new(crate::error::ErrorCode::InvalidParameter, e))?;
    }

    let trigger = Trigger {
        id: TriggerId(Uuid::new_v4()),
        owner: user.id,
        function_id: crate::models::FunctionId(req.function_id),
        config: req.config,
        status: TriggerStatus::Active,
        created_at: Utc::now(),
    };
    triggers_repo::create(&state.pool, &trigger).await?;
    state.scheduler.register(trigger.clone()).await;
    Ok(super::created(trigger))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let trigger = triggers_repo::get(&state.pool, TriggerId(id)).await?;
    Ok(ok(trigger))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    state.scheduler.unregister(TriggerId(id)).await;
    triggers_repo::delete(&state.pool, TriggerId(id)).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn fire(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<serde_json::Value>,
) -> AppResult<axum::response::Response> {
    let trigger = triggers_repo::get(&state.pool, TriggerId(id)).await?;
    let enqueued = state.scheduler.fire_manual(&trigger, params).await?;
    Ok(ok(serde_json::json!({ "enqueued": enqueued })))
}

async fn history(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let events = triggers_repo::history(&state.pool, TriggerId(id)).await?;
    Ok(ok(events))
}
