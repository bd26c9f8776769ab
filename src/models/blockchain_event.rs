use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockchainEventId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockchainEventState {
    Confirmed,
    Orphaned,
}

/// A canonicalized on-chain log (spec §3/§4.7). Deduplicated on
/// `(tx_hash, log_index)` at the storage layer (a unique constraint), which
/// gives P8 (indexer replay idempotency) directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainEvent {
    pub id: BlockchainEventId,
    pub contract: String,
    pub event_name: String,
    pub parameters: serde_json::Value,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub block_hash: String,
    pub timestamp: DateTime<Utc>,
    pub state: BlockchainEventState,
}
