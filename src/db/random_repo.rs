use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{RandomRequest, RandomRequestId, RandomRequestStatus, UserId};

fn row_to_request(row: &sqlx::postgres::PgRow) -> AppResult<RandomRequest> {
    let status_str: String = row.try_get("status")?;
    Ok(RandomRequest {
        id: RandomRequestId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        seed: row.try_get("seed")?,
        status: match status_str.as_str() {
            "fulfilled" => RandomRequestStatus::Fulfilled,
            "failed" => RandomRequestStatus::Failed,
            _ => RandomRequestStatus::Pending,
        },
        result: row.try_get("result")?,
        proof: row.try_get("proof")?,
        callback_tx_id: row.try_get("callback_tx_id")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

pub async fn create(pool: &PgPool, r: &RandomRequest) -> AppResult<()> {
    sqlx::query("INSERT INTO random_requests (id, owner, seed, status, created_at) VALUES ($1,$2,$3,'pending',$4)")
        .bind(r.id.0)
        .bind(r.owner.0)
        .bind(&r.seed)
        .bind(r.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_for_owner(pool: &PgPool, owner: UserId) -> AppResult<Vec<RandomRequest>> {
    let rows = sqlx::query("SELECT * FROM random_requests WHERE owner = $1 ORDER BY created_at DESC")
        .bind(owner.0)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_request).collect()
}

pub async fn get(pool: &PgPool, id: RandomRequestId) -> AppResult<RandomRequest> {
    let row = sqlx::query("SELECT * FROM random_requests WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("random request"))?;
    row_to_request(&row)
}

pub async fn fulfill(pool: &PgPool, id: RandomRequestId, result: &str, proof: &str, callback_tx_id: Option<Uuid>) -> AppResult<()> {
    sqlx::query(
        "UPDATE random_requests SET status = 'fulfilled', result = $1, proof = $2, callback_tx_id = $3, resolved_at = now() WHERE id = $4",
    )
    .bind(result)
    .bind(proof)
    .bind(callback_tx_id)
    .bind(id.0)
    .execute(pool)
    .await?;
    Ok(())
}
