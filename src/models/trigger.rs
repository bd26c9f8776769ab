use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::function::FunctionId;
use super::user::UserId;

/// Cron schedules may not fire more often than this (spec §3).
pub const MIN_CRON_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCondition {
    Above,
    Below,
    Between,
}

/// Tagged-variant trigger configuration (design note §9: closed variant +
/// handler table, not subclassing).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    Cron {
        /// Six-field cron expression (seconds field included).
        schedule: String,
    },
    Price {
        pair: String,
        condition: PriceCondition,
        threshold: Option<f64>,
        low: Option<f64>,
        high: Option<f64>,
    },
    ChainEvent {
        contract_hash: String,
        event_name: String,
        /// Partial-match tree; see subscription matcher semantics (spec §4.8).
        parameters: Option<serde_json::Value>,
    },
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub owner: UserId,
    pub function_id: FunctionId,
    pub config: TriggerConfig,
    pub status: TriggerStatus,
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    pub fn type_name(&self) -> &'static str {
        match self.config {
            TriggerConfig::Cron { .. } => "cron",
            TriggerConfig::Price { .. } => "price",
            TriggerConfig::ChainEvent { .. } => "chain_event",
            TriggerConfig::Manual => "manual",
        }
    }
}
