use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    HttpMethod, OracleAuth, OracleDataSource, OracleDataSourceId, OracleRequest, OracleRequestId,
    OracleRequestStatus, UserId,
};

fn row_to_source(row: &sqlx::postgres::PgRow) -> AppResult<OracleDataSource> {
    let method_str: String = row.try_get("method")?;
    let auth: serde_json::Value = row.try_get("auth")?;
    Ok(OracleDataSource {
        id: OracleDataSourceId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        method: if method_str == "POST" {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        },
        headers: row.try_get("headers")?,
        auth: serde_json::from_value(auth).unwrap_or(OracleAuth::None),
        response_path: row.try_get("response_path")?,
        transform_script: row.try_get("transform_script")?,
    })
}

pub async fn create(pool: &PgPool, s: &OracleDataSource) -> AppResult<()> {
    let method_str = match s.method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
    };
    let auth = serde_json::to_value(&s.auth)?;
    sqlx::query(
        "INSERT INTO oracle_data_sources (id, owner, name, url, method, headers, auth, response_path, transform_script)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(s.id.0)
    .bind(s.owner.0)
    .bind(&s.name)
    .bind(&s.url)
    .bind(method_str)
    .bind(&s.headers)
    .bind(auth)
    .bind(&s.response_path)
    .bind(&s.transform_script)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: OracleDataSourceId) -> AppResult<OracleDataSource> {
    let row = sqlx::query("SELECT * FROM oracle_data_sources WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("oracle data source"))?;
    row_to_source(&row)
}

pub async fn list_for_owner(pool: &PgPool, owner: UserId) -> AppResult<Vec<OracleDataSource>> {
    let rows = sqlx::query("SELECT * FROM oracle_data_sources WHERE owner = $1")
        .bind(owner.0)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_source).collect()
}

pub async fn delete(pool: &PgPool, id: OracleDataSourceId) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM oracle_data_sources WHERE id = $1")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("oracle data source"));
    }
    Ok(())
}

fn row_to_request(row: &sqlx::postgres::PgRow) -> AppResult<OracleRequest> {
    let status_str: String = row.try_get("status")?;
    Ok(OracleRequest {
        id: OracleRequestId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        data_source_id: OracleDataSourceId(row.try_get("data_source_id")?),
        status: match status_str.as_str() {
            "fulfilled" => OracleRequestStatus::Fulfilled,
            "failed" => OracleRequestStatus::Failed,
            _ => OracleRequestStatus::Pending,
        },
        result: row.try_get("result")?,
        callback_contract: row.try_get("callback_contract")?,
        callback_tx_id: row.try_get("callback_tx_id")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

pub async fn create_request(pool: &PgPool, r: &OracleRequest) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO oracle_requests (id, owner, data_source_id, status, callback_contract, created_at)
         VALUES ($1,$2,$3,'pending',$4,$5)",
    )
    .bind(r.id.0)
    .bind(r.owner.0)
    .bind(r.data_source_id.0)
    .bind(&r.callback_contract)
    .bind(r.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_request(pool: &PgPool, id: OracleRequestId) -> AppResult<OracleRequest> {
    let row = sqlx::query("SELECT * FROM oracle_requests WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("oracle request"))?;
    row_to_request(&row)
}

pub async fn resolve_request(
    pool: &PgPool,
    id: OracleRequestId,
    status: OracleRequestStatus,
    result: Option<serde_json::Value>,
    callback_tx_id: Option<Uuid>,
) -> AppResult<()> {
    let status_str = match status {
        OracleRequestStatus::Fulfilled => "fulfilled",
        OracleRequestStatus::Failed => "failed",
        OracleRequestStatus::Pending => "pending",
    };
    sqlx::query(
        "UPDATE oracle_requests SET status = $1, result = $2, callback_tx_id = $3, resolved_at = now() WHERE id = $4",
    )
    .bind(status_str)
    .bind(result)
    .bind(callback_tx_id)
    .bind(id.0)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_pending(pool: &PgPool) -> AppResult<Vec<OracleRequest>> {
    let rows = sqlx::query(
        "SELECT * FROM oracle_requests WHERE status = 'pending' ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_request).collect()
}
