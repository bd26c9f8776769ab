//! Gas-bank ledger (C6): a thin service façade over `db::gasbank_repo`,
//! exposing exactly the four operations spec.md §4.6 names. All arithmetic
//! and locking lives in the repo's SERIALIZABLE transactions; this module's
//! job is to be the one call site the rest of the platform (C5, C10) uses
//! instead of reaching into `db::gasbank_repo` directly.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::bus::TxEventBus;
use crate::db::gasbank_repo;
use crate::error::AppResult;
use crate::models::transaction::TxStatus;
use crate::models::{AllocationId, GasBankAccount, TxId, UserId};

pub struct GasBankLedger {
    pool: PgPool,
}

impl GasBankLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn account(&self, user_id: UserId) -> AppResult<GasBankAccount> {
        gasbank_repo::get_account(&self.pool, user_id).await
    }

    pub async fn deposit(&self, user_id: UserId, amount: i64, chain_tx: &str) -> AppResult<GasBankAccount> {
        gasbank_repo::deposit(&self.pool, user_id, amount, chain_tx).await
    }

    pub async fn allocate(&self, user_id: UserId, tx_id: TxId, amount: i64) -> AppResult<AllocationId> {
        gasbank_repo::allocate(&self.pool, user_id, tx_id, amount).await
    }

    pub async fn capture(&self, allocation_id: AllocationId, actual_amount: i64) -> AppResult<()> {
        gasbank_repo::capture(&self.pool, allocation_id, actual_amount).await
    }

    pub async fn refund(&self, allocation_id: AllocationId) -> AppResult<()> {
        gasbank_repo::refund(&self.pool, allocation_id).await
    }

    /// Resolves the allocation backing a transaction as soon as that
    /// transaction reaches a terminal state: captured on `confirmed` (using
    /// `gas_consumed` if known, else the full reservation), refunded on
    /// `failed`/`expired`/`cancelled` (spec §4.6 I4).
    pub fn spawn_tx_consumer(self: Arc<Self>, bus: &TxEventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let change = match rx.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "gas bank tx consumer lagged behind bus");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(err) = self.resolve_for_change(change.tx_id, change.current).await {
                    tracing::error!(?err, "failed to resolve gas allocation for transaction");
                }
            }
        })
    }

    async fn resolve_for_change(&self, tx_id: TxId, status: TxStatus) -> AppResult<()> {
        let Some(allocation_id) = gasbank_repo::allocation_for_tx(&self.pool, tx_id).await? else {
            return Ok(());
        };
        match status {
            TxStatus::Confirmed => {
                let tx = crate::db::transactions_repo::get(&self.pool, tx_id).await?;
                let actual = tx.gas_consumed.unwrap_or(tx.system_fee + tx.network_fee);
                self.capture(allocation_id, actual).await
            }
            TxStatus::Failed | TxStatus::Expired | TxStatus::Cancelled => {
                self.refund(allocation_id).await
            }
            _ => Ok(()),
        }
    }
}
