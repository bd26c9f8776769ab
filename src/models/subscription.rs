use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Webhook,
    Email,
    InApp,
    Automation,
}

/// Filters by `(contract, event, parameter-tree, block range)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscription {
    pub id: SubscriptionId,
    pub owner: UserId,
    pub contract_address: String,
    pub event_name: String,
    /// Nested match specification: literal, `"*"` wildcard, object, or array.
    pub parameter_tree: serde_json::Value,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub subscription_type: SubscriptionType,
    pub webhook_url: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: u64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

/// Indexed on `(subscription, event)` per spec §3; one delivery-attempt
/// record per matched event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotification {
    pub id: NotificationId,
    pub subscription_id: SubscriptionId,
    pub event_id: Uuid,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_response_status: Option<u16>,
    pub created_at: DateTime<Utc>,
}
