use sqlx::{PgPool, Postgres, Row, Transaction as SqlTx};

use crate::error::AppResult;
use crate::models::{BlockchainEvent, BlockchainEventId, BlockchainEventState};

fn state_str(s: BlockchainEventState) -> &'static str {
    match s {
        BlockchainEventState::Confirmed => "confirmed",
        BlockchainEventState::Orphaned => "orphaned",
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> AppResult<BlockchainEvent> {
    let state_str: String = row.try_get("state")?;
    Ok(BlockchainEvent {
        id: BlockchainEventId(row.try_get("id")?),
        contract: row.try_get("contract")?,
        event_name: row.try_get("event_name")?,
        parameters: row.try_get("parameters")?,
        tx_hash: row.try_get("tx_hash")?,
        log_index: row.try_get::<i32, _>("log_index")? as u32,
        block_number: row.try_get::<i64, _>("block_number")? as u64,
        block_hash: row.try_get("block_hash")?,
        timestamp: row.try_get("timestamp")?,
        state: if state_str == "orphaned" {
            BlockchainEventState::Orphaned
        } else {
            BlockchainEventState::Confirmed
        },
    })
}

pub async fn get_cursor(pool: &PgPool, network: &str) -> AppResult<i64> {
    let row = sqlx::query("SELECT last_processed_block FROM indexer_cursors WHERE network = $1")
        .bind(network)
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(row) => row.try_get("last_processed_block")?,
        None => -1,
    })
}

/// Writes every event of one block and advances the cursor atomically
/// (spec §4.7: "the cursor advance must be atomic with the event writes").
/// Per-event inserts use `ON CONFLICT DO NOTHING` on `(tx_hash, log_index)`,
/// giving P8 (replay idempotency) even if the block is reprocessed after a crash.
pub async fn write_block_events(
    pool: &PgPool,
    network: &str,
    block_height: u64,
    events: &[BlockchainEvent],
) -> AppResult<()> {
    let mut db_tx: SqlTx<'_, Postgres> = pool.begin().await?;

    for event in events {
        sqlx::query(
            "INSERT INTO blockchain_events
             (id, contract, event_name, parameters, tx_hash, log_index, block_number, block_hash, timestamp, state)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
             ON CONFLICT (tx_hash, log_index) DO NOTHING",
        )
        .bind(event.id.0)
        .bind(&event.contract)
        .bind(&event.event_name)
        .bind(&event.parameters)
        .bind(&event.tx_hash)
        .bind(event.log_index as i32)
        .bind(event.block_number as i64)
        .bind(&event.block_hash)
        .bind(event.timestamp)
        .bind(state_str(event.state))
        .execute(&mut *db_tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO indexer_cursors (network, last_processed_block) VALUES ($1, $2)
         ON CONFLICT (network) DO UPDATE SET last_processed_block = EXCLUDED.last_processed_block",
    )
    .bind(network)
    .bind(block_height as i64)
    .execute(&mut *db_tx)
    .await?;

    db_tx.commit().await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: BlockchainEventId) -> AppResult<BlockchainEvent> {
    let row = sqlx::query("SELECT * FROM blockchain_events WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| crate::error::AppError::not_found("blockchain event"))?;
    row_to_event(&row)
}

pub async fn list_in_range(pool: &PgPool, from_height: u64, to_height: u64) -> AppResult<Vec<BlockchainEvent>> {
    let rows = sqlx::query(
        "SELECT * FROM blockchain_events WHERE block_number BETWEEN $1 AND $2 ORDER BY block_number, log_index",
    )
    .bind(from_height as i64)
    .bind(to_height as i64)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_event).collect()
}
