//! REST surface (spec §6). Generalizes the teacher's two flat
//! `Router::new().route(...)` handlers into grouped sub-routers, one file
//! per group, merged here and mounted under `/api/v1` by `main.rs`.

pub mod auth;
pub mod functions;
pub mod gasbank;
pub mod oracle;
pub mod price_feeds;
pub mod random;
pub mod secrets;
pub mod subscriptions;
pub mod transactions;
pub mod triggers;

use std::sync::Arc;

use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use sqlx::PgPool;

use crate::bus::EventBus;
use crate::coordinator::Coordinator;
use crate::enclave::EnclaveRuntime;
use crate::gasbank::GasBankLedger;
use crate::pricefeed::PriceFeedAggregator;
use crate::random::RandomService;
use crate::scheduler::Scheduler;
use crate::secrets::SecretStore;
use crate::tx::manager::TransactionManager;
use crate::wallet::WalletStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub secrets: Arc<SecretStore>,
    pub wallet: Arc<WalletStore>,
    pub enclave: Arc<dyn EnclaveRuntime>,
    pub tx_manager: Arc<TransactionManager>,
    pub gasbank: Arc<GasBankLedger>,
    pub scheduler: Arc<Scheduler>,
    pub coordinator: Arc<Coordinator>,
    pub pricefeed: Arc<PriceFeedAggregator>,
    pub random: Arc<RandomService>,
    pub bus: EventBus,
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

/// Success envelope: `{success:true, data:...}` (spec §6).
pub fn ok<T: Serialize>(data: T) -> Response {
    (axum::http::StatusCode::OK, Json(Envelope { success: true, data })).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (axum::http::StatusCode::CREATED, Json(Envelope { success: true, data })).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/functions", functions::router())
        .nest("/secrets", secrets::router())
        .nest("/triggers", triggers::router())
        .nest("/transactions", transactions::router())
        .nest("/gasbank", gasbank::router())
        .nest("/oracle", oracle::router())
        .nest("/price-feeds", price_feeds::router())
        .nest("/random", random::router())
        .nest("/subscriptions", subscriptions::router())
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> Response {
    ok(serde_json::json!({ "status": "ok" }))
}
