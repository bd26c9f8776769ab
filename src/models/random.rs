use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomRequestId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomRequestStatus {
    Pending,
    Fulfilled,
    Failed,
}

/// `/random` (spec §6 route table): the route group is named but has no
/// [MODULE] of its own in §3/§4, so the request/fulfillment lifecycle shape
/// here mirrors `OracleRequest`'s (§3) with a seed/result/proof payload in
/// place of a data-source fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomRequest {
    pub id: RandomRequestId,
    pub owner: UserId,
    pub seed: String,
    pub status: RandomRequestStatus,
    pub result: Option<String>,
    pub proof: Option<String>,
    pub callback_tx_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
