//! P9 (price-feed publish condition), scenario S5's exact numbers: a feed
//! with no prior on-chain price always publishes its first round; a
//! subsequent round inside a fresh heartbeat and under the deviation
//! threshold must not publish again. Drives the full fetch -> aggregate ->
//! maybe-publish pipeline (`PriceFeedAggregator::run_round`) against a
//! local HTTP source and a `FakeChainClient`, rather than just the pure
//! `should_publish` branch already unit-tested in `pricefeed::tests`.

use std::sync::{Arc, Mutex as StdMutex};

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use neo_oracle_platform::bus::{PriceEventBus, TxEventBus};
use neo_oracle_platform::chain::FakeChainClient;
use neo_oracle_platform::db::{oracle_repo, pricefeeds_repo, users_repo, wallet_repo};
use neo_oracle_platform::models::oracle::{HttpMethod, OracleAuth, OracleDataSource, OracleDataSourceId};
use neo_oracle_platform::models::price_feed::{PriceFeed, PriceFeedId, WeightedSource};
use neo_oracle_platform::models::{User, UserId, WalletAccount, WalletAccountId};
use neo_oracle_platform::pricefeed::PriceFeedAggregator;
use neo_oracle_platform::tx::manager::TransactionManager;
use neo_oracle_platform::wallet::WalletStore;
use sqlx::Row;
use uuid::Uuid;

async fn price_handler(State(state): State<Arc<StdMutex<f64>>>) -> axum::Json<serde_json::Value> {
    let price = *state.lock().unwrap();
    axum::Json(serde_json::json!({ "price": price }))
}

async fn spawn_price_source(initial: f64) -> (String, Arc<StdMutex<f64>>) {
    let state = Arc::new(StdMutex::new(initial));
    let app = Router::new().route("/price", get(price_handler)).with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/price"), state)
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

async fn publish_count(pool: &sqlx::PgPool, feed_id: Uuid) -> i64 {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM transactions WHERE entity_id = $1")
        .bind(feed_id)
        .fetch_one(pool)
        .await
        .unwrap();
    row.try_get("n").unwrap()
}

#[sqlx::test]
async fn publishes_on_first_round_then_suppresses_small_deviation(pool: sqlx::PgPool) {
    let owner = seed_user(&pool).await;
    let (url, price_state) = spawn_price_source(10.06).await;

    let source = OracleDataSource {
        id: OracleDataSourceId(Uuid::new_v4()),
        owner,
        name: "s1".to_string(),
        url,
        method: HttpMethod::Get,
        headers: serde_json::json!({}),
        auth: OracleAuth::None,
        response_path: "/price".to_string(),
        transform_script: None,
    };
    oracle_repo::create(&pool, &source).await.unwrap();

    let feed = PriceFeed {
        id: PriceFeedId(Uuid::new_v4()),
        pair: "GAS/USD".to_string(),
        sources: vec![WeightedSource { data_source_id: source.id.0, weight: 1.0 }],
        update_interval_secs: 60,
        deviation_threshold: 0.005,
        heartbeat_interval_secs: 86_400,
        contract_address: "0xfeed".to_string(),
        min_sources: 1,
        last_price: None,
        last_round_id: 0,
        last_on_chain_price: None,
        last_on_chain_publish_at: None,
    };
    pricefeeds_repo::create(&pool, &feed).await.unwrap();

    wallet_repo::set_active(
        &pool,
        &WalletAccount {
            id: WalletAccountId(Uuid::new_v4()),
            service: "price_feed".to_string(),
            address: "Npricefeed".to_string(),
            encrypted_private_key: vec![0u8; 16],
            public_key: "Nfeedpubkey".to_string(),
            created_at: Utc::now(),
            active: true,
        },
    )
    .await
    .unwrap();

    let chain = Arc::new(FakeChainClient::new());
    let tx_manager = Arc::new(TransactionManager::new(pool.clone(), chain.clone(), TxEventBus::new()));
    let wallet = Arc::new(WalletStore::new(pool.clone(), [9u8; 32]));
    let aggregator = PriceFeedAggregator::new(pool.clone(), PriceEventBus::new(), wallet, tx_manager);

    // S5: no prior on-chain price -> the first round always publishes.
    aggregator.run_round("GAS/USD").await.unwrap();
    assert_eq!(publish_count(&pool, feed.id.0).await, 1, "S5: first round publishes unconditionally");

    let after_first = pricefeeds_repo::get_by_pair(&pool, "GAS/USD").await.unwrap();
    assert_eq!(after_first.last_on_chain_price, Some(10.06));

    // S5: 10.06 -> 10.08 is a 0.2% move against a 0.5% threshold, heartbeat fresh.
    *price_state.lock().unwrap() = 10.08;
    aggregator.run_round("GAS/USD").await.unwrap();
    assert_eq!(
        publish_count(&pool, feed.id.0).await,
        1,
        "S5: a sub-threshold move inside a fresh heartbeat must not publish again"
    );

    // A breach of the deviation threshold publishes again.
    *price_state.lock().unwrap() = 10.50;
    aggregator.run_round("GAS/USD").await.unwrap();
    assert_eq!(publish_count(&pool, feed.id.0).await, 2, "a deviation breach must publish");
}
