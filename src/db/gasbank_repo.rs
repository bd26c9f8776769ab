use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction as SqlTx};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationId, AllocationStatus, GasAllocation, GasBankAccount, LedgerEntry, LedgerEntryId,
    LedgerEntryKind, TxId, UserId,
};

pub async fn get_account(pool: &PgPool, user_id: UserId) -> AppResult<GasBankAccount> {
    let row = sqlx::query("SELECT * FROM gas_bank_accounts WHERE user_id = $1")
        .bind(user_id.0)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(GasBankAccount {
            user_id,
            available: row.try_get("available")?,
            reserved: row.try_get("reserved")?,
        }),
        None => Ok(GasBankAccount {
            user_id,
            available: 0,
            reserved: 0,
        }),
    }
}

async fn ensure_account(db_tx: &mut SqlTx<'_, Postgres>, user_id: UserId) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO gas_bank_accounts (user_id, available, reserved) VALUES ($1, 0, 0)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id.0)
    .execute(&mut **db_tx)
    .await?;
    Ok(())
}

/// Records a confirmed on-chain deposit into the user's available balance.
pub async fn deposit(pool: &PgPool, user_id: UserId, amount: i64, chain_tx: &str) -> AppResult<GasBankAccount> {
    let mut db_tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *db_tx)
        .await?;
    ensure_account(&mut db_tx, user_id).await?;

    sqlx::query("UPDATE gas_bank_accounts SET available = available + $1 WHERE user_id = $2")
        .bind(amount)
        .bind(user_id.0)
        .execute(&mut *db_tx)
        .await?;

    insert_ledger_entry(&mut db_tx, user_id, LedgerEntryKind::Deposit, amount, Some(chain_tx), None).await?;

    let row = sqlx::query("SELECT * FROM gas_bank_accounts WHERE user_id = $1")
        .bind(user_id.0)
        .fetch_one(&mut *db_tx)
        .await?;
    db_tx.commit().await?;
    Ok(GasBankAccount {
        user_id,
        available: row.try_get("available")?,
        reserved: row.try_get("reserved")?,
    })
}

/// `available -= amount; reserved += amount` iff `available >= amount`,
/// else `insufficient_gas` (spec §4.6, I1).
pub async fn allocate(pool: &PgPool, user_id: UserId, tx_id: TxId, amount: i64) -> AppResult<AllocationId> {
    let mut db_tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *db_tx)
        .await?;
    ensure_account(&mut db_tx, user_id).await?;

    let row = sqlx::query("SELECT available FROM gas_bank_accounts WHERE user_id = $1 FOR UPDATE")
        .bind(user_id.0)
        .fetch_one(&mut *db_tx)
        .await?;
    let available: i64 = row.try_get("available")?;
    if available < amount {
        return Err(AppError::insufficient_gas(available, amount));
    }

    sqlx::query(
        "UPDATE gas_bank_accounts SET available = available - $1, reserved = reserved + $1 WHERE user_id = $2",
    )
    .bind(amount)
    .bind(user_id.0)
    .execute(&mut *db_tx)
    .await?;

    let allocation_id = AllocationId(Uuid::new_v4());
    sqlx::query(
        "INSERT INTO gas_allocations (id, user_id, tx_id, amount, status, created_at)
         VALUES ($1, $2, $3, $4, 'reserved', $5)",
    )
    .bind(allocation_id.0)
    .bind(user_id.0)
    .bind(tx_id.0)
    .bind(amount)
    .bind(Utc::now())
    .execute(&mut *db_tx)
    .await?;

    db_tx.commit().await?;
    Ok(allocation_id)
}

/// Looks up the reserved allocation backing a transaction, if any. Used by
/// the bus consumer that captures/refunds on a transaction's terminal
/// transition (spec §4.6 I4).
pub async fn allocation_for_tx(pool: &PgPool, tx_id: TxId) -> AppResult<Option<AllocationId>> {
    let row = sqlx::query("SELECT id FROM gas_allocations WHERE tx_id = $1 AND status = 'reserved'")
        .bind(tx_id.0)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.try_get("id")).transpose()?.map(AllocationId))
}

async fn load_allocation(db_tx: &mut SqlTx<'_, Postgres>, id: AllocationId) -> AppResult<GasAllocation> {
    let row = sqlx::query("SELECT * FROM gas_allocations WHERE id = $1 FOR UPDATE")
        .bind(id.0)
        .fetch_optional(&mut **db_tx)
        .await?
        .ok_or_else(|| AppError::not_found("gas allocation"))?;
    let status_str: String = row.try_get("status")?;
    Ok(GasAllocation {
        id,
        user_id: UserId(row.try_get("user_id")?),
        tx_id: TxId(row.try_get("tx_id")?),
        amount: row.try_get("amount")?,
        status: match status_str.as_str() {
            "captured" => AllocationStatus::Captured,
            "refunded" => AllocationStatus::Refunded,
            _ => AllocationStatus::Reserved,
        },
        actual_amount: row.try_get("actual_amount")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

/// Releases `amount - actual_amount` back to available, withdraws `actual_amount`.
/// Fails with `invalid_state` if the allocation is already resolved (I3).
pub async fn capture(pool: &PgPool, id: AllocationId, actual_amount: i64) -> AppResult<()> {
    let mut db_tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *db_tx)
        .await?;

    let allocation = load_allocation(&mut db_tx, id).await?;
    if allocation.status != AllocationStatus::Reserved {
        return Err(AppError::new(
            crate::error::ErrorCode::InvalidState,
            "allocation already resolved",
        ));
    }
    if actual_amount > allocation.amount {
        return Err(AppError::new(
            crate::error::ErrorCode::InvalidParameter,
            "actual_amount exceeds allocation",
        ));
    }

    let refund_to_available = allocation.amount - actual_amount;
    sqlx::query(
        "UPDATE gas_bank_accounts SET reserved = reserved - $1, available = available + $2 WHERE user_id = $3",
    )
    .bind(allocation.amount)
    .bind(refund_to_available)
    .bind(allocation.user_id.0)
    .execute(&mut *db_tx)
    .await?;

    sqlx::query(
        "UPDATE gas_allocations SET status = 'captured', actual_amount = $1, resolved_at = $2 WHERE id = $3",
    )
    .bind(actual_amount)
    .bind(Utc::now())
    .bind(id.0)
    .execute(&mut *db_tx)
    .await?;

    insert_ledger_entry(
        &mut db_tx,
        allocation.user_id,
        LedgerEntryKind::Capture,
        actual_amount,
        None,
        Some(id),
    )
    .await?;

    db_tx.commit().await?;
    Ok(())
}

/// Returns the full allocation to available (used on `failed|expired|cancelled`).
pub async fn refund(pool: &PgPool, id: AllocationId) -> AppResult<()> {
    let mut db_tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *db_tx)
        .await?;

    let allocation = load_allocation(&mut db_tx, id).await?;
    if allocation.status != AllocationStatus::Reserved {
        return Err(AppError::new(
            crate::error::ErrorCode::InvalidState,
            "allocation already resolved",
        ));
    }

    sqlx::query("UPDATE gas_bank_accounts SET reserved = reserved - $1, available = available + $1 WHERE user_id = $2")
        .bind(allocation.amount)
        .bind(allocation.user_id.0)
        .execute(&mut *db_tx)
        .await?;

    sqlx::query("UPDATE gas_allocations SET status = 'refunded', resolved_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(id.0)
        .execute(&mut *db_tx)
        .await?;

    db_tx.commit().await?;
    Ok(())
}

async fn insert_ledger_entry(
    db_tx: &mut SqlTx<'_, Postgres>,
    user_id: UserId,
    kind: LedgerEntryKind,
    amount: i64,
    chain_tx: Option<&str>,
    allocation_id: Option<AllocationId>,
) -> AppResult<()> {
    let kind_str = match kind {
        LedgerEntryKind::Deposit => "deposit",
        LedgerEntryKind::Withdrawal => "withdrawal",
        LedgerEntryKind::Capture => "capture",
    };
    sqlx::query(
        "INSERT INTO ledger_entries (id, user_id, kind, amount, chain_tx, allocation_id) VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id.0)
    .bind(kind_str)
    .bind(amount)
    .bind(chain_tx)
    .bind(allocation_id.map(|a| a.0))
    .execute(&mut **db_tx)
    .await?;
    Ok(())
}

#[allow(dead_code)]
pub async fn all_ledger_entries(pool: &PgPool, user_id: UserId) -> AppResult<Vec<LedgerEntry>> {
    let rows = sqlx::query("SELECT * FROM ledger_entries WHERE user_id = $1 ORDER BY created_at")
        .bind(user_id.0)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| {
            let kind_str: String = row.try_get("kind")?;
            Ok(LedgerEntry {
                id: LedgerEntryId(row.try_get("id")?),
                user_id,
                kind: match kind_str.as_str() {
                    "withdrawal" => LedgerEntryKind::Withdrawal,
                    "capture" => LedgerEntryKind::Capture,
                    _ => LedgerEntryKind::Deposit,
                },
                amount: row.try_get("amount")?,
                chain_tx: row.try_get("chain_tx")?,
                allocation_id: row.try_get::<Option<Uuid>, _>("allocation_id")?.map(AllocationId),
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
