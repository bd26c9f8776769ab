//! `/gasbank` (spec §6): balance, deposit, and ledger history.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::gasbank_repo;
use crate::error::AppResult;

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/balance", get(balance))
        .route("/deposit", post(deposit))
        .route("/ledger", get(ledger))
}

async fn balance(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let account = state.gasbank.account(user.id).await?;
    Ok(ok(account))
}

#[derive(Deserialize)]
struct DepositRequest {
    amount: i64,
    chain_tx: String,
}

async fn deposit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<DepositRequest>,
) -> AppResult<axum::response::Response> {
    let account = state.gasbank.deposit(user.id, req.amount, &req.chain_tx).await?;
    Ok(ok(account))
}

async fn ledger(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let entries = gasbank_repo::all_ledger_entries(&state.pool, user.id).await?;
    Ok(ok(entries))
}
