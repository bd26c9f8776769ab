use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorCode};
use crate::models::{Function, FunctionId, UserId};

fn row_to_function(row: &sqlx::postgres::PgRow) -> AppResult<Function> {
    let secret_refs: serde_json::Value = row.try_get("secret_refs")?;
    Ok(Function {
        id: FunctionId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        name: row.try_get("name")?,
        source: row.try_get("source")?,
        secret_refs: serde_json::from_value(secret_refs).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn create(pool: &PgPool, f: &Function) -> AppResult<()> {
    let secret_refs = serde_json::to_value(&f.secret_refs)?;
    let existing = sqlx::query("SELECT 1 FROM functions WHERE owner = $1 AND name = $2")
        .bind(f.owner.0)
        .bind(&f.name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::new(
            ErrorCode::ResourceAlreadyExists,
            "function name already exists for this owner",
        ));
    }
    sqlx::query(
        "INSERT INTO functions (id, owner, name, source, secret_refs, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(f.id.0)
    .bind(f.owner.0)
    .bind(&f.name)
    .bind(&f.source)
    .bind(secret_refs)
    .bind(f.created_at)
    .bind(f.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: FunctionId) -> AppResult<Function> {
    let row = sqlx::query("SELECT * FROM functions WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("function"))?;
    row_to_function(&row)
}

pub async fn list_for_owner(pool: &PgPool, owner: UserId) -> AppResult<Vec<Function>> {
    let rows = sqlx::query("SELECT * FROM functions WHERE owner = $1 ORDER BY created_at")
        .bind(owner.0)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_function).collect()
}

pub async fn update_source(pool: &PgPool, id: FunctionId, source: &str, secret_refs: &[String]) -> AppResult<()> {
    let refs = serde_json::to_value(secret_refs)?;
    let result = sqlx::query(
        "UPDATE functions SET source = $1, secret_refs = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(source)
    .bind(refs)
    .bind(Utc::now())
    .bind(id.0)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("function"));
    }
    Ok(())
}

pub async fn delete(pool: &PgPool, id: FunctionId) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM functions WHERE id = $1")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("function"));
    }
    Ok(())
}

pub async fn exists(pool: &PgPool, id: FunctionId) -> AppResult<bool> {
    let row = sqlx::query("SELECT 1 FROM functions WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

#[allow(dead_code)]
pub(crate) fn new_function_id() -> FunctionId {
    FunctionId(Uuid::new_v4())
}
