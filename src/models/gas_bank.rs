use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::TxId;
use super::user::UserId;

/// Per-user prepaid balance, in GAS-fraction minor units (never floats, so
/// the conservation invariant I2 is exact arithmetic).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasBankAccount {
    pub user_id: UserId,
    pub available: i64,
    pub reserved: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Reserved,
    Captured,
    Refunded,
}

/// A reservation of prepaid gas against a transaction id (glossary:
/// "Allocation"). Terminated by exactly one of `capture` or `refund` (I3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasAllocation {
    pub id: AllocationId,
    pub user_id: UserId,
    pub tx_id: TxId,
    pub amount: i64,
    pub status: AllocationStatus,
    pub actual_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Deposit,
    Withdrawal,
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(pub Uuid);

/// Append-only ledger row backing the `Σ deposits − Σ withdrawals = available
/// + reserved` invariant (I2); lets the conservation property be checked by
/// summing rows rather than trusting the running balance alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub kind: LedgerEntryKind,
    pub amount: i64,
    pub chain_tx: Option<String>,
    pub allocation_id: Option<AllocationId>,
    pub created_at: DateTime<Utc>,
}
