//! `/transactions` (spec §6): list, get, retry, cancel.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::db::transactions_repo;
use crate::error::AppResult;
use crate::models::TxId;

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(get_one))
        .route("/:id/retry", post(retry))
        .route("/:id/cancel", post(cancel))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let txs = transactions_repo::list_for_user(&state.pool, user.id.0).await?;
    Ok(ok(txs))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let tx = transactions_repo::get(&state.pool, TxId(id)).await?;
    Ok(ok(tx))
}

async fn retry(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let tx = transactions_repo::get(&state.pool, TxId(id)).await?;
    let updated = state.tx_manager.retry_submit(&tx).await?;
    Ok(ok(updated))
}

async fn cancel(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let updated = state.tx_manager.cancel(TxId(id)).await?;
    Ok(ok(updated))
}
