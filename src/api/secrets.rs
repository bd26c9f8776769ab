//! `/secrets` (spec §6): CRUD; plaintext values are never returned on read.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:name", axum::routing::put(update).delete(remove))
}

#[derive(Deserialize)]
struct PutRequest {
    name: String,
    value: String,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let secrets = state.secrets.list(user.id).await?;
    // Never return ciphertext/nonce over the wire, only identifying metadata.
    let summaries: Vec<_> = secrets
        .into_iter()
        .map(|s| serde_json::json!({ "id": s.id.0, "name": s.name, "expires_at": s.expires_at }))
        .collect();
    Ok(ok(summaries))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<PutRequest>,
) -> AppResult<axum::response::Response> {
    let id = state
        .secrets
        .put(user.id, &req.name, req.value.as_bytes(), req.expires_at)
        .await?;
    Ok(super::created(serde_json::json!({ "id": id.0, "name": req.name })))
}

#[derive(Deserialize)]
struct UpdateRequest {
    value: String,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> AppResult<axum::response::Response> {
    // Secrets are sealed at write time; "updating" one is put-or-replace.
    let id = state.secrets.put(user.id, &name, req.value.as_bytes(), req.expires_at).await?;
    Ok(ok(serde_json::json!({ "id": id.0, "name": name })))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> AppResult<axum::response::Response> {
    state.secrets.delete(user.id, &name).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
