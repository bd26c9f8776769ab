//! `/random` (spec §6): request a seeded random value, fetch its result, and
//! verify a (seed, result, proof) triple independently of the stored record.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::random_repo;
use crate::error::AppResult;
use crate::models::RandomRequestId;

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(request))
        .route("/:id", get(get_one))
        .route("/verify", post(verify))
}

#[derive(Deserialize)]
struct RequestBody {
    seed: String,
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let requests = random_repo::list_for_owner(&state.pool, user.id).await?;
    Ok(ok(requests))
}

async fn request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<RequestBody>,
) -> AppResult<axum::response::Response> {
    let id = state.random.request(user.id, req.seed).await?;
    Ok(super::created(serde_json::json!({ "id": id.0 })))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let request = state.random.get(RandomRequestId(id)).await?;
    Ok(ok(request))
}

#[derive(Deserialize)]
struct VerifyRequest {
    seed: String,
    result: String,
    proof: String,
}

async fn verify(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(req): Json<VerifyRequest>,
) -> AppResult<axum::response::Response> {
    let valid = state.random.verify(&req.seed, &req.result, &req.proof);
    Ok(ok(serde_json::json!({ "valid": valid })))
}
