use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult, ErrorCode};
use crate::models::{DataKey, DataKeyId, Secret, SecretAccessAudit, SecretId, UserId};

fn row_to_secret(row: &sqlx::postgres::PgRow) -> AppResult<Secret> {
    Ok(Secret {
        id: SecretId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        name: row.try_get("name")?,
        ciphertext: row.try_get("ciphertext")?,
        nonce: row.try_get("nonce")?,
        data_key_id: DataKeyId(row.try_get("data_key_id")?),
        metadata: row.try_get("metadata")?,
        expires_at: row.try_get("expires_at")?,
    })
}

pub async fn create(pool: &PgPool, s: &Secret) -> AppResult<()> {
    let existing = sqlx::query("SELECT 1 FROM secrets WHERE owner = $1 AND name = $2")
        .bind(s.owner.0)
        .bind(&s.name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::new(
            ErrorCode::ResourceAlreadyExists,
            "secret name already exists for this owner",
        ));
    }
    sqlx::query(
        "INSERT INTO secrets (id, owner, name, ciphertext, nonce, data_key_id, metadata, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(s.id.0)
    .bind(s.owner.0)
    .bind(&s.name)
    .bind(&s.ciphertext)
    .bind(&s.nonce)
    .bind(s.data_key_id.0)
    .bind(&s.metadata)
    .bind(s.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_by_name(pool: &PgPool, owner: UserId, name: &str) -> AppResult<Option<Secret>> {
    let row = sqlx::query("SELECT * FROM secrets WHERE owner = $1 AND name = $2")
        .bind(owner.0)
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_secret).transpose()
}

pub async fn list_for_owner(pool: &PgPool, owner: UserId) -> AppResult<Vec<Secret>> {
    let rows = sqlx::query("SELECT * FROM secrets WHERE owner = $1")
        .bind(owner.0)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_secret).collect()
}

pub async fn delete(pool: &PgPool, owner: UserId, name: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM secrets WHERE owner = $1 AND name = $2")
        .bind(owner.0)
        .bind(name)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("secret"));
    }
    Ok(())
}

pub async fn active_data_key(pool: &PgPool) -> AppResult<DataKey> {
    let row = sqlx::query("SELECT * FROM data_keys WHERE active ORDER BY created_at DESC LIMIT 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("active data key"))?;
    Ok(DataKey {
        id: DataKeyId(row.try_get("id")?),
        wrapped_key: row.try_get("wrapped_key")?,
        created_at: row.try_get("created_at")?,
        active: row.try_get("active")?,
    })
}

pub async fn get_data_key(pool: &PgPool, id: DataKeyId) -> AppResult<DataKey> {
    let row = sqlx::query("SELECT * FROM data_keys WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("data key"))?;
    Ok(DataKey {
        id: DataKeyId(row.try_get("id")?),
        wrapped_key: row.try_get("wrapped_key")?,
        created_at: row.try_get("created_at")?,
        active: row.try_get("active")?,
    })
}

/// Rotation: deactivate the current active key, insert a new one. Old keys
/// stay in the table (and thus remain usable for decryption) per spec §4.3.
pub async fn rotate_data_key(pool: &PgPool, new_key: &DataKey) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE data_keys SET active = false WHERE active")
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO data_keys (id, wrapped_key, created_at, active) VALUES ($1, $2, $3, true)")
        .bind(new_key.id.0)
        .bind(&new_key.wrapped_key)
        .bind(new_key.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn record_access(pool: &PgPool, audit: &SecretAccessAudit) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO secret_access_audit (owner, secret_id, execution_id, accessed_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(audit.owner.0)
    .bind(audit.secret_id.0)
    .bind(audit.execution_id)
    .bind(audit.accessed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn is_expired(secret: &Secret) -> bool {
    secret.is_expired(Utc::now())
}
