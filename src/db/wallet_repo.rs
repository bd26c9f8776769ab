use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{WalletAccount, WalletAccountId};

fn row_to_wallet(row: &sqlx::postgres::PgRow) -> AppResult<WalletAccount> {
    Ok(WalletAccount {
        id: WalletAccountId(row.try_get("id")?),
        service: row.try_get("service")?,
        address: row.try_get("address")?,
        encrypted_private_key: row.try_get("encrypted_private_key")?,
        public_key: row.try_get("public_key")?,
        created_at: row.try_get("created_at")?,
        active: row.try_get("active")?,
    })
}

pub async fn get_active(pool: &PgPool, service: &str) -> AppResult<WalletAccount> {
    let row = sqlx::query("SELECT * FROM wallet_accounts WHERE service = $1 AND active")
        .bind(service)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("wallet account"))?;
    row_to_wallet(&row)
}

/// Deactivates any existing active key for the service and inserts the new
/// one, preserving "one active signing key per service scope" (spec §3).
pub async fn set_active(pool: &PgPool, account: &WalletAccount) -> AppResult<()> {
    let mut db_tx = pool.begin().await?;
    sqlx::query("UPDATE wallet_accounts SET active = false WHERE service = $1")
        .bind(&account.service)
        .execute(&mut *db_tx)
        .await?;
    sqlx::query(
        "INSERT INTO wallet_accounts (id, service, address, encrypted_private_key, public_key, created_at, active)
         VALUES ($1,$2,$3,$4,$5,$6,true)",
    )
    .bind(account.id.0)
    .bind(&account.service)
    .bind(&account.address)
    .bind(&account.encrypted_private_key)
    .bind(&account.public_key)
    .bind(account.created_at)
    .execute(&mut *db_tx)
    .await?;
    db_tx.commit().await?;
    Ok(())
}
