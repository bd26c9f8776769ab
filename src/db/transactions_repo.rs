use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction as SqlTx};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    FailureReason, Transaction, TransactionEvent, TransactionEventId, TxId, TxStatus, TxType,
};

fn status_str(s: TxStatus) -> &'static str {
    match s {
        TxStatus::Created => "created",
        TxStatus::Submitted => "submitted",
        TxStatus::Pending => "pending",
        TxStatus::Confirming => "confirming",
        TxStatus::Confirmed => "confirmed",
        TxStatus::Failed => "failed",
        TxStatus::Expired => "expired",
        TxStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> TxStatus {
    match s {
        "submitted" => TxStatus::Submitted,
        "pending" => TxStatus::Pending,
        "confirming" => TxStatus::Confirming,
        "confirmed" => TxStatus::Confirmed,
        "failed" => TxStatus::Failed,
        "expired" => TxStatus::Expired,
        "cancelled" => TxStatus::Cancelled,
        _ => TxStatus::Created,
    }
}

fn type_str(t: TxType) -> &'static str {
    match t {
        TxType::FunctionCallback => "function_callback",
        TxType::PriceFeedPublish => "price_feed_publish",
        TxType::RandomFulfillment => "random_fulfillment",
        TxType::GasBankWithdrawal => "gas_bank_withdrawal",
    }
}

fn parse_type(s: &str) -> TxType {
    match s {
        "price_feed_publish" => TxType::PriceFeedPublish,
        "random_fulfillment" => TxType::RandomFulfillment,
        "gas_bank_withdrawal" => TxType::GasBankWithdrawal,
        _ => TxType::FunctionCallback,
    }
}

fn reason_str(r: FailureReason) -> &'static str {
    match r {
        FailureReason::RpcError => "rpc_error",
        FailureReason::Reverted => "reverted",
        FailureReason::Expired => "expired",
        FailureReason::InsufficientGas => "insufficient_gas",
        FailureReason::UserCancelled => "user_cancelled",
    }
}

fn parse_reason(s: &str) -> FailureReason {
    match s {
        "reverted" => FailureReason::Reverted,
        "expired" => FailureReason::Expired,
        "insufficient_gas" => FailureReason::InsufficientGas,
        "user_cancelled" => FailureReason::UserCancelled,
        _ => FailureReason::RpcError,
    }
}

fn row_to_tx(row: &sqlx::postgres::PgRow) -> AppResult<Transaction> {
    Ok(Transaction {
        id: TxId(row.try_get("id")?),
        hash: row.try_get("hash")?,
        service: row.try_get("service")?,
        entity_id: row.try_get("entity_id")?,
        entity_type: row.try_get("entity_type")?,
        status: parse_status(row.try_get::<String, _>("status")?.as_str()),
        tx_type: parse_type(row.try_get::<String, _>("tx_type")?.as_str()),
        payload: row.try_get("payload")?,
        gas_price: row.try_get("gas_price")?,
        system_fee: row.try_get("system_fee")?,
        network_fee: row.try_get("network_fee")?,
        gas_consumed: row.try_get("gas_consumed")?,
        block_height: row.try_get::<Option<i64>, _>("block_height")?.map(|h| h as u64),
        block_time: row.try_get("block_time")?,
        sender_address: row.try_get("sender_address")?,
        error: row.try_get("error")?,
        failure_reason: row
            .try_get::<Option<String>, _>("failure_reason")?
            .map(|s| parse_reason(&s)),
        result: row.try_get("result")?,
        event_count: row.try_get::<i32, _>("event_count")? as u32,
        submit_attempts: row.try_get::<i32, _>("submit_attempts")? as u32,
        status_updated_at: row.try_get("status_updated_at")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create(pool: &PgPool, tx: &Transaction, user_id: Option<Uuid>) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO transactions
         (id, hash, service, entity_id, entity_type, status, tx_type, payload, gas_price,
          system_fee, network_fee, sender_address, event_count, submit_attempts,
          status_updated_at, created_at, user_id)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)",
    )
    .bind(tx.id.0)
    .bind(&tx.hash)
    .bind(&tx.service)
    .bind(tx.entity_id)
    .bind(&tx.entity_type)
    .bind(status_str(tx.status))
    .bind(type_str(tx.tx_type))
    .bind(&tx.payload)
    .bind(tx.gas_price)
    .bind(tx.system_fee)
    .bind(tx.network_fee)
    .bind(&tx.sender_address)
    .bind(tx.event_count as i32)
    .bind(tx.submit_attempts as i32)
    .bind(tx.status_updated_at)
    .bind(tx.created_at)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: TxId) -> AppResult<Transaction> {
    let row = sqlx::query("SELECT * FROM transactions WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("transaction"))?;
    row_to_tx(&row)
}

pub async fn list_non_terminal(pool: &PgPool) -> AppResult<Vec<Transaction>> {
    let rows = sqlx::query(
        "SELECT * FROM transactions WHERE status NOT IN ('confirmed','failed','expired','cancelled')",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_tx).collect()
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<Transaction>> {
    let rows = sqlx::query("SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_tx).collect()
}

/// Applies a status transition, bumping `event_count`/`status_updated_at`
/// and appending a `TransactionEvent` in the same SERIALIZABLE transaction
/// (spec §4.5: "these two fields are consistency-critical and must be
/// updated in the same atomic write as the status change").
pub async fn apply_transition(
    pool: &PgPool,
    id: TxId,
    new_status: TxStatus,
    details: serde_json::Value,
    hash: Option<&str>,
    failure_reason: Option<FailureReason>,
) -> AppResult<Transaction> {
    let mut db_tx: SqlTx<'_, Postgres> = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *db_tx)
        .await?;

    let row = sqlx::query("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
        .bind(id.0)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| AppError::not_found("transaction"))?;
    let current = row_to_tx(&row)?;

    let now = Utc::now();
    let new_event_count = current.event_count + 1;

    sqlx::query(
        "UPDATE transactions SET status = $1, hash = COALESCE($2, hash), failure_reason = $3,
         event_count = $4, status_updated_at = $5 WHERE id = $6",
    )
    .bind(status_str(new_status))
    .bind(hash)
    .bind(failure_reason.map(reason_str))
    .bind(new_event_count as i32)
    .bind(now)
    .bind(id.0)
    .execute(&mut *db_tx)
    .await?;

    let event = TransactionEvent {
        id: TransactionEventId(Uuid::new_v4()),
        tx_id: id,
        status: new_status,
        details,
        timestamp: now,
    };
    sqlx::query(
        "INSERT INTO transaction_events (id, tx_id, status, details, timestamp) VALUES ($1,$2,$3,$4,$5)",
    )
    .bind(event.id.0)
    .bind(event.tx_id.0)
    .bind(status_str(event.status))
    .bind(&event.details)
    .bind(event.timestamp)
    .execute(&mut *db_tx)
    .await?;

    db_tx.commit().await?;

    Ok(Transaction {
        status: new_status,
        hash: hash.map(str::to_string).or(current.hash),
        failure_reason,
        event_count: new_event_count,
        status_updated_at: now,
        ..current
    })
}

pub async fn increment_submit_attempts(pool: &PgPool, id: TxId) -> AppResult<u32> {
    let row = sqlx::query(
        "UPDATE transactions SET submit_attempts = submit_attempts + 1 WHERE id = $1 RETURNING submit_attempts",
    )
    .bind(id.0)
    .fetch_one(pool)
    .await?;
    Ok(row.try_get::<i32, _>("submit_attempts")? as u32)
}
