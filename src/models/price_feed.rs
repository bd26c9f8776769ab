use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceFeedId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedSource {
    pub data_source_id: Uuid,
    pub weight: f64,
}

/// `{ pair, sources, update_interval, deviation_threshold, heartbeat_interval,
/// contract_address }` from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeed {
    pub id: PriceFeedId,
    pub pair: String,
    pub sources: Vec<WeightedSource>,
    pub update_interval_secs: u64,
    pub deviation_threshold: f64,
    pub heartbeat_interval_secs: u64,
    pub contract_address: String,
    pub min_sources: usize,
    pub last_price: Option<f64>,
    pub last_round_id: u64,
    pub last_on_chain_price: Option<f64>,
    pub last_on_chain_publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePointId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: PricePointId,
    pub pair: String,
    pub round_id: u64,
    pub price: f64,
    pub surviving_sources: usize,
    pub timestamp: DateTime<Utc>,
}

/// Internal-bus payload published once per aggregation round (spec §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub pair: String,
    pub round_id: u64,
    pub price: f64,
    pub surviving_sources: usize,
    pub timestamp: DateTime<Utc>,
}
