use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

/// Legal states of the spec §4.5 state machine. Ordered so that a naive
/// numeric comparison is *not* meaningful across branches (e.g. `Confirming`
/// and `Expired` are siblings, not ordered) -- monotonicity is about the
/// transition graph, not discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Created,
    Submitted,
    Pending,
    Confirming,
    Confirmed,
    Failed,
    Expired,
    Cancelled,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxStatus::Confirmed | TxStatus::Failed | TxStatus::Expired | TxStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    FunctionCallback,
    PriceFeedPublish,
    RandomFulfillment,
    GasBankWithdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RpcError,
    Reverted,
    Expired,
    InsufficientGas,
    UserCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub hash: Option<String>,
    pub service: String,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub status: TxStatus,
    pub tx_type: TxType,
    pub payload: serde_json::Value,
    pub gas_price: i64,
    pub system_fee: i64,
    pub network_fee: i64,
    pub gas_consumed: Option<i64>,
    pub block_height: Option<u64>,
    pub block_time: Option<DateTime<Utc>>,
    pub sender_address: String,
    pub error: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub result: Option<serde_json::Value>,
    pub event_count: u32,
    pub submit_attempts: u32,
    pub status_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionEventId(pub Uuid);

/// Append-only history per transaction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id: TransactionEventId,
    pub tx_id: TxId,
    pub status: TxStatus,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Published on the internal bus (§4.5: "every status transition is
/// published on an internal bus consumed by C6 ... and ... the websocket
/// notifier").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusChange {
    pub tx_id: TxId,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub previous: Option<TxStatus>,
    pub current: TxStatus,
    pub failure_reason: Option<FailureReason>,
    pub at: DateTime<Utc>,
}

/// A `tx_intent` returned by user code (spec §4.4/§4.10/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxIntent {
    pub script: String,
    pub signers: Vec<String>,
    pub gas_budget: i64,
}
