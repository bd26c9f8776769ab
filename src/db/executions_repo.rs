use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::{Execution, ExecutionId, ExecutionStatus, FunctionId, UserId};

fn status_str(s: ExecutionStatus) -> &'static str {
    match s {
        ExecutionStatus::Success => "success",
        ExecutionStatus::Error => "error",
        ExecutionStatus::Timeout => "timeout",
        ExecutionStatus::MemoryExceeded => "memory_exceeded",
        ExecutionStatus::SandboxViolation => "sandbox_violation",
    }
}

fn parse_status(s: &str) -> ExecutionStatus {
    match s {
        "success" => ExecutionStatus::Success,
        "timeout" => ExecutionStatus::Timeout,
        "memory_exceeded" => ExecutionStatus::MemoryExceeded,
        "sandbox_violation" => ExecutionStatus::SandboxViolation,
        _ => ExecutionStatus::Error,
    }
}

pub async fn insert(pool: &PgPool, e: &Execution) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO executions
         (id, function_id, user_id, started_at, finished_at, status, duration_ms, result_json, error_msg, params_json)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(e.id.0)
    .bind(e.function_id.0)
    .bind(e.user_id.0)
    .bind(e.started_at)
    .bind(e.finished_at)
    .bind(status_str(e.status))
    .bind(e.duration_ms as i64)
    .bind(&e.result_json)
    .bind(&e.error_msg)
    .bind(&e.params_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_for_function(pool: &PgPool, function_id: FunctionId) -> AppResult<Vec<Execution>> {
    let rows = sqlx::query(
        "SELECT * FROM executions WHERE function_id = $1 ORDER BY started_at DESC LIMIT 200",
    )
    .bind(function_id.0)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(Execution {
                id: ExecutionId(row.try_get("id")?),
                function_id: FunctionId(row.try_get("function_id")?),
                user_id: UserId(row.try_get("user_id")?),
                started_at: row.try_get("started_at")?,
                finished_at: row.try_get("finished_at")?,
                status: parse_status(row.try_get::<String, _>("status")?.as_str()),
                duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
                result_json: row.try_get("result_json")?,
                error_msg: row.try_get("error_msg")?,
                params_json: row.try_get("params_json")?,
            })
        })
        .collect()
}
