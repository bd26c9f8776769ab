//! Price-feed aggregator (C11): per-feed interval task that fetches every
//! configured source in parallel, filters outliers, takes a weighted
//! median, and publishes on-chain when the deviation or heartbeat
//! condition from spec §4.11 is met. Bypasses C4 entirely (spec §2 data
//! flow note: "Price feeds (C11) bypass C4 and produce C5 txs directly on
//! the platform's wallet").

pub mod stats;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::PriceEventBus;
use crate::db::{oracle_repo, pricefeeds_repo};
use crate::error::AppResult;
use crate::models::oracle::{HttpMethod, OracleAuth, OracleDataSource};
use crate::models::price_feed::{PriceFeed, PriceUpdate};
use crate::models::transaction::TxType;
use crate::tx::manager::{NewTransaction, TransactionManager};
use crate::wallet::WalletStore;

use stats::Sample;

/// Fixed-point scale applied before constructing the on-chain publish
/// payload (spec §4.11: "invoking the feed's contract with `(pair,
/// price_scaled, round_id)`"); GAS and most Neo N3 fungible tokens use 8
/// decimals, so this matches that convention.
pub const PRICE_SCALE: i64 = 100_000_000;
const SOURCE_FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(8);

pub struct PriceFeedAggregator {
    pool: PgPool,
    http: Client,
    bus: PriceEventBus,
    wallet: Arc<WalletStore>,
    tx_manager: Arc<TransactionManager>,
}

impl PriceFeedAggregator {
    pub fn new(
        pool: PgPool,
        bus: PriceEventBus,
        wallet: Arc<WalletStore>,
        tx_manager: Arc<TransactionManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            http: Client::new(),
            bus,
            wallet,
            tx_manager,
        })
    }

    /// Spawns one interval-driven task per configured feed (spec §4.11:
    /// "Per feed, every `update_interval`").
    pub async fn start(self: &Arc<Self>) -> AppResult<Vec<tokio::task::JoinHandle<()>>> {
        let feeds = pricefeeds_repo::list_all(&self.pool).await?;
        Ok(feeds
            .into_iter()
            .map(|feed| self.clone().spawn_feed_loop(feed))
            .collect())
    }

    fn spawn_feed_loop(self: Arc<Self>, feed: PriceFeed) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(feed.update_interval_secs.max(1)));
            let pair = feed.pair.clone();
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_round(&pair).await {
                    tracing::error!(pair = %pair, %err, "price feed aggregation round failed");
                }
            }
        })
    }

    /// One aggregation round for a single pair: fetch, filter, aggregate,
    /// publish internally, maybe publish on-chain. Re-reads the feed row
    /// each round so weight/threshold edits take effect without a restart.
    /// Exposed directly (like `Scheduler::tick_cron`) so a test can drive
    /// one round at a time instead of waiting on `update_interval_secs`.
    pub async fn run_round(&self, pair: &str) -> AppResult<()> {
        let feed = pricefeeds_repo::get_by_pair(&self.pool, pair).await?;

        let mut fetches = Vec::with_capacity(feed.sources.len());
        for weighted_source in &feed.sources {
            let pool = self.pool.clone();
            let http = self.http.clone();
            let weighted_source = weighted_source.clone();
            fetches.push(async move {
                let source = oracle_repo::get(
                    &pool,
                    crate::models::oracle::OracleDataSourceId(weighted_source.data_source_id),
                )
                .await
                .ok()?;
                let price = tokio::time::timeout(SOURCE_FETCH_TIMEOUT, fetch_price(&http, &source))
                    .await
                    .ok()?
                    .ok()?;
                Some(Sample {
                    source_id: source.id.0,
                    weight: weighted_source.weight,
                    price,
                })
            });
        }
        let samples: Vec<Sample> = futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect();

        let survivors = stats::filter_outliers(&samples);
        if survivors.len() < feed.min_sources {
            return Err(crate::error::AppError::new(
                crate::error::ErrorCode::ServiceUnavailable,
                format!(
                    "insufficient_sources: {} of required {}",
                    survivors.len(),
                    feed.min_sources
                ),
            ));
        }
        let Some(price) = stats::weighted_median(&survivors) else {
            return Ok(());
        };

        let round_id = feed.last_round_id + 1;
        let now = Utc::now();
        pricefeeds_repo::record_round(&self.pool, feed.id, &feed.pair, round_id, price, survivors.len()).await?;
        self.bus.publish(PriceUpdate {
            pair: feed.pair.clone(),
            round_id,
            price,
            surviving_sources: survivors.len(),
            timestamp: now,
        });

        if should_publish(&feed, price, now) {
            self.publish_on_chain(&feed, price, round_id).await?;
        }
        Ok(())
    }

    async fn publish_on_chain(&self, feed: &PriceFeed, price: f64, round_id: u64) -> AppResult<()> {
        let price_scaled = (price * PRICE_SCALE as f64).round() as i64;
        let sender_address = self.wallet.get_public_key("price_feed").await.unwrap_or_default();
        self.tx_manager
            .submit(NewTransaction {
                id: None,
                service: "price_feed".to_string(),
                entity_id: feed.id.0,
                entity_type: "price_feed".to_string(),
                tx_type: TxType::PriceFeedPublish,
                payload: serde_json::json!({
                    "pair": feed.pair,
                    "price_scaled": price_scaled,
                    "round_id": round_id,
                    "contract_address": feed.contract_address,
                }),
                signed_bytes: Vec::new(),
                gas_price: 0,
                system_fee: 0,
                network_fee: 0,
                sender_address,
                user_id: None,
            })
            .await?;
        pricefeeds_repo::record_on_chain_publish(&self.pool, feed.id, price).await?;
        Ok(())
    }
}

/// Spec §4.11 P9: publish iff the deviation threshold or the heartbeat
/// interval (whichever comes first) is crossed. A feed with no prior
/// on-chain price always publishes on its first successful round.
fn should_publish(feed: &PriceFeed, new_price: f64, now: chrono::DateTime<Utc>) -> bool {
    let Some(last_price) = feed.last_on_chain_price else {
        return true;
    };
    if last_price != 0.0 {
        let deviation = ((new_price - last_price) / last_price).abs();
        if deviation >= feed.deviation_threshold {
            return true;
        }
    }
    match feed.last_on_chain_publish_at {
        Some(last_publish) => {
            (now - last_publish).num_seconds() as u64 >= feed.heartbeat_interval_secs
        }
        None => true,
    }
}

async fn fetch_price(http: &Client, source: &OracleDataSource) -> AppResult<f64> {
    let mut request = match source.method {
        HttpMethod::Get => http.get(&source.url),
        HttpMethod::Post => http.post(&source.url),
    };
    if let serde_json::Value::Object(headers) = &source.headers {
        for (key, value) in headers {
            if let Some(v) = value.as_str() {
                request = request.header(key, v);
            }
        }
    }
    request = match &source.auth {
        OracleAuth::None => request,
        OracleAuth::Bearer { token } => request.bearer_auth(token),
        OracleAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
        OracleAuth::ApiKeyHeader { header, value } => request.header(header, value),
    };

    let body: serde_json::Value = request.send().await?.json().await?;
    let extracted = body.pointer(&source.response_path).ok_or_else(|| {
        crate::error::AppError::new(
            crate::error::ErrorCode::InvalidFormat,
            format!("response_path {} not found in source body", source.response_path),
        )
    })?;
    extracted
        .as_f64()
        .or_else(|| extracted.as_str().and_then(|s| s.parse::<f64>().ok()))
        .ok_or_else(|| {
            crate::error::AppError::new(
                crate::error::ErrorCode::InvalidFormat,
                "extracted value is not numeric",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::price_feed::{PriceFeedId, WeightedSource};

    fn feed(last_on_chain_price: Option<f64>, last_publish: Option<chrono::DateTime<Utc>>) -> PriceFeed {
        PriceFeed {
            id: PriceFeedId(Uuid::new_v4()),
            pair: "GAS/USD".to_string(),
            sources: vec![WeightedSource { data_source_id: Uuid::new_v4(), weight: 1.0 }],
            update_interval_secs: 60,
            deviation_threshold: 0.005,
            heartbeat_interval_secs: 86400,
            contract_address: "0xfeed".to_string(),
            min_sources: 1,
            last_price: Some(10.0),
            last_round_id: 1,
            last_on_chain_price,
            last_on_chain_publish_at: last_publish,
        }
    }

    #[test]
    fn publishes_on_first_round() {
        assert!(should_publish(&feed(None, None), 10.0, Utc::now()));
    }

    #[test]
    fn publishes_on_deviation_breach() {
        // S5: 10.0 -> 10.06 is a 0.6% move against a 0.5% threshold.
        assert!(should_publish(&feed(Some(10.0), Some(Utc::now())), 10.06, Utc::now()));
    }

    #[test]
    fn suppresses_publish_below_threshold_with_fresh_heartbeat() {
        // S5: 10.06 -> 10.08 is a 0.2% move, heartbeat just reset.
        assert!(!should_publish(&feed(Some(10.06), Some(Utc::now())), 10.08, Utc::now()));
    }

    #[test]
    fn publishes_on_heartbeat_expiry() {
        let stale = Utc::now() - chrono::Duration::hours(25);
        assert!(should_publish(&feed(Some(10.0), Some(stale)), 10.001, Utc::now()));
    }
}
