//! Transaction manager (C5): owns the lifecycle in `state_machine.rs`,
//! drives it from the chain facade, and is the single writer of
//! `transactions`/`transaction_events` rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::TxEventBus;
use crate::chain::ChainClient;
use crate::db::transactions_repo;
use crate::error::AppResult;
use crate::models::transaction::{
    FailureReason, Transaction, TransactionStatusChange, TxId, TxStatus, TxType,
};

use super::state_machine::{self, TxEvent};

pub const N_CONFIRMATIONS: u64 = 6;
pub const EXPIRY: Duration = Duration::from_secs(3600);
pub const MAX_SUBMIT_ATTEMPTS: u32 = 5;
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RPC_DEADLINE: Duration = Duration::from_secs(10);

pub struct NewTransaction {
    /// Pre-assigned by a caller that must know the id before submission
    /// (e.g. the coordinator, which allocates gas against this tx via C6
    /// before calling `submit`, per spec §4.10 step 6). `None` lets the
    /// manager assign one, for callers with no such ordering constraint.
    pub id: Option<TxId>,
    pub service: String,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub tx_type: TxType,
    pub payload: serde_json::Value,
    pub signed_bytes: Vec<u8>,
    pub gas_price: i64,
    pub system_fee: i64,
    pub network_fee: i64,
    pub sender_address: String,
    pub user_id: Option<Uuid>,
}

pub struct TransactionManager {
    pool: PgPool,
    chain: Arc<dyn ChainClient>,
    bus: TxEventBus,
}

impl TransactionManager {
    pub fn new(pool: PgPool, chain: Arc<dyn ChainClient>, bus: TxEventBus) -> Self {
        Self { pool, chain, bus }
    }

    /// Persists `created`, attempts an RPC submit, and transitions to
    /// `submitted` with the returned hash on acknowledgement (spec §4.5).
    pub async fn submit(&self, new_tx: NewTransaction) -> AppResult<Transaction> {
        let now = Utc::now();
        let mut payload = new_tx.payload;
        if let Some(obj) = payload.as_object_mut() {
            use base64::{engine::general_purpose::STANDARD, Engine};
            obj.insert(
                "signed_bytes".to_string(),
                serde_json::Value::String(STANDARD.encode(&new_tx.signed_bytes)),
            );
        }
        let tx = Transaction {
            id: new_tx.id.unwrap_or_else(|| TxId(Uuid::new_v4())),
            hash: None,
            service: new_tx.service,
            entity_id: new_tx.entity_id,
            entity_type: new_tx.entity_type,
            status: TxStatus::Created,
            tx_type: new_tx.tx_type,
            payload,
            gas_price: new_tx.gas_price,
            system_fee: new_tx.system_fee,
            network_fee: new_tx.network_fee,
            gas_consumed: None,
            block_height: None,
            block_time: None,
            sender_address: new_tx.sender_address,
            error: None,
            failure_reason: None,
            result: None,
            event_count: 0,
            submit_attempts: 0,
            status_updated_at: now,
            created_at: now,
        };
        transactions_repo::create(&self.pool, &tx, new_tx.user_id).await?;
        self.attempt_submit(tx.id, new_tx.signed_bytes).await
    }

    /// One RPC submit attempt. On success, transitions to `submitted` with
    /// the hash; on failure, either stays `created` (more attempts left) or
    /// terminates `failed(rpc_error)` once `MAX_SUBMIT_ATTEMPTS` is reached.
    async fn attempt_submit(&self, tx_id: TxId, signed_bytes: Vec<u8>) -> AppResult<Transaction> {
        let attempts = transactions_repo::increment_submit_attempts(&self.pool, tx_id).await?;

        match self.chain.submit_signed(signed_bytes, RPC_DEADLINE).await {
            Ok(hash) => self.apply(tx_id, TxEvent::Submit, Some(&hash), None, serde_json::json!({"hash": hash})).await,
            Err(chain_err) => {
                if attempts >= MAX_SUBMIT_ATTEMPTS {
                    self.apply(
                        tx_id,
                        TxEvent::Reject,
                        None,
                        Some(FailureReason::RpcError),
                        serde_json::json!({"error": chain_err.to_string(), "attempts": attempts}),
                    )
                    .await
                } else {
                    tracing::warn!(tx_id = %tx_id.0, attempts, error = %chain_err, "submit attempt failed, will retry");
                    transactions_repo::get(&self.pool, tx_id).await
                }
            }
        }
    }

    /// Retries a submit attempt for a transaction still stuck at `created`
    /// (called by the poll loop).
    pub async fn retry_submit(&self, tx: &Transaction) -> AppResult<Transaction> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let signed_bytes = tx
            .payload
            .get("signed_bytes")
            .and_then(|v| v.as_str())
            .and_then(|s| STANDARD.decode(s).ok())
            .unwrap_or_default();
        self.attempt_submit(tx.id, signed_bytes).await
    }

    /// A `submitted` tx can't be queried for mempool presence directly over
    /// this RPC surface, so the next poll tick advances it to `pending`
    /// (spec §4.5's `enter_mempool` edge).
    pub async fn advance_to_pending(&self, tx_id: TxId) -> AppResult<Transaction> {
        self.apply(tx_id, TxEvent::EnterMempool, None, None, serde_json::json!({})).await
    }

    pub async fn poll_pending(&self, tx: &Transaction) -> AppResult<Transaction> {
        if Utc::now().signed_duration_since(tx.created_at).num_seconds() as u64 > EXPIRY.as_secs() {
            return self
                .apply(tx.id, TxEvent::ExpiredWhilePending, None, Some(FailureReason::Expired), serde_json::json!({}))
                .await;
        }

        let Some(hash) = &tx.hash else {
            return Ok(tx.clone());
        };
        match self.chain.get_transaction_receipt(hash, RPC_DEADLINE).await {
            Ok(receipt) if receipt.block_height.is_some() => {
                self.apply(
                    tx.id,
                    TxEvent::Included,
                    None,
                    None,
                    serde_json::json!({"block_height": receipt.block_height}),
                )
                .await
            }
            Ok(_) => Ok(tx.clone()),
            Err(err) if err.is_transient() => {
                tracing::debug!(tx_id = %tx.id.0, %err, "transient error polling receipt");
                Ok(tx.clone())
            }
            Err(_not_found_yet) => Ok(tx.clone()),
        }
    }

    pub async fn poll_confirming(&self, tx: &Transaction) -> AppResult<Transaction> {
        let Some(hash) = &tx.hash else {
            return Ok(tx.clone());
        };
        let receipt = match self.chain.get_transaction_receipt(hash, RPC_DEADLINE).await {
            Ok(r) => r,
            Err(err) if err.is_transient() => return Ok(tx.clone()),
            Err(err) => return Err(err.into()),
        };

        if receipt.reverted {
            return self
                .apply(
                    tx.id,
                    TxEvent::Revert,
                    None,
                    Some(FailureReason::Reverted),
                    serde_json::json!({"vm_state": receipt.vm_state}),
                )
                .await;
        }

        let Some(block_height) = receipt.block_height else {
            return Ok(tx.clone());
        };
        let head = self.chain.get_height(RPC_DEADLINE).await?;
        let confirmations = head.saturating_sub(block_height) + 1;
        if confirmations >= N_CONFIRMATIONS {
            self.apply(
                tx.id,
                TxEvent::ReachedConfirmations,
                None,
                None,
                serde_json::json!({"gas_consumed": receipt.gas_consumed}),
            )
            .await
        } else {
            Ok(tx.clone())
        }
    }

    pub async fn cancel(&self, tx_id: TxId) -> AppResult<Transaction> {
        self.apply(tx_id, TxEvent::Cancel, None, Some(FailureReason::UserCancelled), serde_json::json!({})).await
    }

    async fn apply(
        &self,
        tx_id: TxId,
        event: TxEvent,
        hash: Option<&str>,
        failure_reason: Option<FailureReason>,
        details: serde_json::Value,
    ) -> AppResult<Transaction> {
        let current = transactions_repo::get(&self.pool, tx_id).await?;
        let (next, reason) = state_machine::transition(current.status, event).map_err(|e| {
            crate::error::AppError::new(crate::error::ErrorCode::InvalidState, e.to_string())
        })?;
        let updated = transactions_repo::apply_transition(
            &self.pool,
            tx_id,
            next,
            details,
            hash,
            failure_reason.or(reason),
        )
        .await?;

        self.bus.publish(TransactionStatusChange {
            tx_id,
            entity_id: updated.entity_id,
            entity_type: updated.entity_type.clone(),
            previous: Some(current.status),
            current: updated.status,
            failure_reason: updated.failure_reason,
            at: updated.status_updated_at,
        });

        Ok(updated)
    }
}
