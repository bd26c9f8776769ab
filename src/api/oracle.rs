//! `/oracle` (spec §6): data-source CRUD plus request/fulfillment.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::oracle_repo;
use crate::error::AppResult;
use crate::models::{
    HttpMethod, OracleAuth, OracleDataSource, OracleDataSourceId, OracleRequest, OracleRequestId,
    OracleRequestStatus,
};

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/:id", get(get_source).delete(remove_source))
        .route("/requests", get(list_pending).post(create_request))
        .route("/requests/:id", get(get_request))
}

#[derive(Deserialize)]
struct CreateSourceRequest {
    name: String,
    url: String,
    method: HttpMethod,
    #[serde(default)]
    headers: serde_json::Value,
    #[serde(default = "default_auth")]
    auth: OracleAuth,
    response_path: String,
    #[serde(default)]
    transform_script: Option<String>,
}

fn default_auth() -> OracleAuth {
    OracleAuth::None
}

async fn list_sources(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let sources = oracle_repo::list_for_owner(&state.pool, user.id).await?;
    Ok(ok(sources))
}

async fn create_source(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateSourceRequest>,
) -> AppResult<axum::response::Response> {
    let source = OracleDataSource {
        id: OracleDataSourceId(Uuid::new_v4()),
        owner: user.id,
        name: req.name,
        url: req.url,
        method: req.method,
        headers: req.headers,
        auth: req.auth,
        response_path: req.response_path,
        transform_script: req.transform_script,
    };
    oracle_repo::create(&state.pool, &source).await?;
    Ok(super::created(source))
}

async fn get_source(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let source = oracle_repo::get(&state.pool, OracleDataSourceId(id)).await?;
    Ok(ok(source))
}

async fn remove_source(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    oracle_repo::delete(&state.pool, OracleDataSourceId(id)).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

#[derive(Deserialize)]
struct CreateOracleRequest {
    data_source_id: Uuid,
    #[serde(default)]
    callback_contract: Option<String>,
}

async fn create_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateOracleRequest>,
) -> AppResult<axum::response::Response> {
    let request = OracleRequest {
        id: OracleRequestId(Uuid::new_v4()),
        owner: user.id,
        data_source_id: OracleDataSourceId(req.data_source_id),
        status: OracleRequestStatus::Pending,
        result: None,
        callback_contract: req.callback_contract,
        callback_tx_id: None,
        created_at: Utc::now(),
        resolved_at: None,
    };
    oracle_repo::create_request(&state.pool, &request).await?;
    Ok(super::created(request))
}

async fn list_pending(State(state): State<AppState>, AuthUser(_user): AuthUser) -> AppResult<axum::response::Response> {
    let requests = oracle_repo::list_pending(&state.pool).await?;
    Ok(ok(requests))
}

async fn get_request(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let request = oracle_repo::get_request(&state.pool, OracleRequestId(id)).await?;
    Ok(ok(request))
}
