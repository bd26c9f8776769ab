//! `/price-feeds` (spec §6): feed CRUD plus latest price and history.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::pricefeeds_repo;
use crate::error::AppResult;
use crate::models::{PriceFeed, PriceFeedId, WeightedSource};

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:pair", get(get_one))
        .route("/:pair/history", get(history))
}

#[derive(Deserialize)]
struct CreateRequest {
    pair: String,
    sources: Vec<WeightedSource>,
    update_interval_secs: u64,
    deviation_threshold: f64,
    heartbeat_interval_secs: u64,
    contract_address: String,
    min_sources: usize,
}

async fn list(State(state): State<AppState>, AuthUser(_user): AuthUser) -> AppResult<axum::response::Response> {
    let feeds = pricefeeds_repo::list_all(&state.pool).await?;
    Ok(ok(feeds))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(req): Json<CreateRequest>,
) -> AppResult<axum::response::Response> {
    let feed = PriceFeed {
        id: PriceFeedId(Uuid::new_v4()),
        pair: req.pair,
        sources: req.sources,
        update_interval_secs: req.update_interval_secs,
        deviation_threshold: req.deviation_threshold,
        heartbeat_interval_secs: req.heartbeat_interval_secs,
        contract_address: req.contract_address,
        min_sources: req.min_sources,
        last_price: None,
        last_round_id: 0,
        last_on_chain_price: None,
        last_on_chain_publish_at: None,
    };
    pricefeeds_repo::create(&state.pool, &feed).await?;
    Ok(super::created(feed))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(pair): Path<String>,
) -> AppResult<axum::response::Response> {
    let feed = pricefeeds_repo::get_by_pair(&state.pool, &pair).await?;
    Ok(ok(feed))
}

async fn history(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(pair): Path<String>,
) -> AppResult<axum::response::Response> {
    let points = pricefeeds_repo::history(&state.pool, &pair).await?;
    Ok(ok(points))
}
