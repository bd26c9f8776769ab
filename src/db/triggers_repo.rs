use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{
    FunctionId, Trigger, TriggerConfig, TriggerEvent, TriggerEventId, TriggerEventStatus,
    TriggerId, TriggerStatus, UserId,
};

fn row_to_trigger(row: &sqlx::postgres::PgRow) -> AppResult<Trigger> {
    let config: serde_json::Value = row.try_get("config")?;
    let status_str: String = row.try_get("status")?;
    Ok(Trigger {
        id: TriggerId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        function_id: FunctionId(row.try_get("function_id")?),
        config: serde_json::from_value::<TriggerConfig>(config)
            .map_err(|e| AppError::new(crate::error::ErrorCode::InvalidFormat, e.to_string()))?,
        status: match status_str.as_str() {
            "active" => TriggerStatus::Active,
            "error" => TriggerStatus::Error,
            _ => TriggerStatus::Disabled,
        },
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create(pool: &PgPool, t: &Trigger) -> AppResult<()> {
    let config = serde_json::to_value(&t.config)?;
    sqlx::query(
        "INSERT INTO triggers (id, owner, function_id, config, status, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(t.id.0)
    .bind(t.owner.0)
    .bind(t.function_id.0)
    .bind(config)
    .bind(status_str(t.status))
    .bind(t.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

fn status_str(s: TriggerStatus) -> &'static str {
    match s {
        TriggerStatus::Active => "active",
        TriggerStatus::Error => "error",
        TriggerStatus::Disabled => "disabled",
    }
}

pub async fn get(pool: &PgPool, id: TriggerId) -> AppResult<Trigger> {
    let row = sqlx::query("SELECT * FROM triggers WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("trigger"))?;
    row_to_trigger(&row)
}

pub async fn list_active(pool: &PgPool) -> AppResult<Vec<Trigger>> {
    let rows = sqlx::query("SELECT * FROM triggers WHERE status = 'active'")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_trigger).collect()
}

pub async fn set_status(pool: &PgPool, id: TriggerId, status: TriggerStatus) -> AppResult<()> {
    sqlx::query("UPDATE triggers SET status = $1 WHERE id = $2")
        .bind(status_str(status))
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: TriggerId) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM triggers WHERE id = $1")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("trigger"));
    }
    Ok(())
}

pub async fn insert_trigger_event(pool: &PgPool, ev: &TriggerEvent) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO trigger_events (id, trigger_id, fired_at, status, execution_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ev.id.0)
    .bind(ev.trigger_id.0)
    .bind(ev.fired_at)
    .bind(match ev.status {
        TriggerEventStatus::Running => "running",
        TriggerEventStatus::Success => "success",
        TriggerEventStatus::Error => "error",
    })
    .bind(ev.execution_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn history(pool: &PgPool, trigger_id: TriggerId) -> AppResult<Vec<TriggerEvent>> {
    let rows = sqlx::query(
        "SELECT * FROM trigger_events WHERE trigger_id = $1 ORDER BY fired_at DESC LIMIT 200",
    )
    .bind(trigger_id.0)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            let status_str: String = row.try_get("status")?;
            Ok(TriggerEvent {
                id: TriggerEventId(row.try_get("id")?),
                trigger_id: TriggerId(row.try_get("trigger_id")?),
                fired_at: row.try_get("fired_at")?,
                status: match status_str.as_str() {
                    "running" => TriggerEventStatus::Running,
                    "success" => TriggerEventStatus::Success,
                    _ => TriggerEventStatus::Error,
                },
                execution_id: row.try_get("execution_id")?,
            })
        })
        .collect()
}

/// Atomic dedup insert (spec §4.9 P4): returns `true` if this fire_id was new.
pub async fn try_claim_fire_id(pool: &PgPool, fire_id: &str, trigger_id: TriggerId) -> AppResult<bool> {
    let result = sqlx::query(
        "INSERT INTO fire_dedup (fire_id, trigger_id) VALUES ($1, $2)
         ON CONFLICT (fire_id) DO NOTHING",
    )
    .bind(fire_id)
    .bind(trigger_id.0)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Sweeps fire_dedup rows past the 24h TTL (spec §4.9).
pub async fn sweep_expired_fire_ids(pool: &PgPool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM fire_dedup WHERE created_at < now() - interval '24 hours'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
