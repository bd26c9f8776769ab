use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    EventNotification, EventSubscription, NotificationId, NotificationStatus, SubscriptionId,
    SubscriptionType, UserId,
};

fn sub_type_str(t: SubscriptionType) -> &'static str {
    match t {
        SubscriptionType::Webhook => "webhook",
        SubscriptionType::Email => "email",
        SubscriptionType::InApp => "in_app",
        SubscriptionType::Automation => "automation",
    }
}

fn parse_sub_type(s: &str) -> SubscriptionType {
    match s {
        "email" => SubscriptionType::Email,
        "in_app" => SubscriptionType::InApp,
        "automation" => SubscriptionType::Automation,
        _ => SubscriptionType::Webhook,
    }
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> AppResult<EventSubscription> {
    Ok(EventSubscription {
        id: SubscriptionId(row.try_get("id")?),
        owner: UserId(row.try_get("owner")?),
        contract_address: row.try_get("contract_address")?,
        event_name: row.try_get("event_name")?,
        parameter_tree: row.try_get("parameter_tree")?,
        start_block: row.try_get::<Option<i64>, _>("start_block")?.map(|v| v as u64),
        end_block: row.try_get::<Option<i64>, _>("end_block")?.map(|v| v as u64),
        subscription_type: parse_sub_type(row.try_get::<String, _>("subscription_type")?.as_str()),
        webhook_url: row.try_get("webhook_url")?,
        last_triggered_at: row.try_get("last_triggered_at")?,
        trigger_count: row.try_get::<i64, _>("trigger_count")? as u64,
        active: row.try_get("active")?,
    })
}

pub async fn create(pool: &PgPool, s: &EventSubscription) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO event_subscriptions
         (id, owner, contract_address, event_name, parameter_tree, start_block, end_block,
          subscription_type, webhook_url, active)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(s.id.0)
    .bind(s.owner.0)
    .bind(&s.contract_address)
    .bind(&s.event_name)
    .bind(&s.parameter_tree)
    .bind(s.start_block.map(|v| v as i64))
    .bind(s.end_block.map(|v| v as i64))
    .bind(sub_type_str(s.subscription_type))
    .bind(&s.webhook_url)
    .bind(s.active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_active_matching(pool: &PgPool, contract: &str, event_name: &str, block_number: u64) -> AppResult<Vec<EventSubscription>> {
    let rows = sqlx::query(
        "SELECT * FROM event_subscriptions
         WHERE active
           AND (contract_address = $1 OR contract_address = '*')
           AND event_name = $2
           AND (start_block IS NULL OR start_block <= $3)
           AND (end_block IS NULL OR end_block >= $3)",
    )
    .bind(contract)
    .bind(event_name)
    .bind(block_number as i64)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_subscription).collect()
}

pub async fn get(pool: &PgPool, id: SubscriptionId) -> AppResult<EventSubscription> {
    let row = sqlx::query("SELECT * FROM event_subscriptions WHERE id = $1")
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("subscription"))?;
    row_to_subscription(&row)
}

pub async fn list_for_owner(pool: &PgPool, owner: UserId) -> AppResult<Vec<EventSubscription>> {
    let rows = sqlx::query("SELECT * FROM event_subscriptions WHERE owner = $1 ORDER BY id")
        .bind(owner.0)
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_subscription).collect()
}

pub async fn delete(pool: &PgPool, id: SubscriptionId) -> AppResult<()> {
    sqlx::query("DELETE FROM event_subscriptions WHERE id = $1")
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn bump_trigger_count(pool: &PgPool, id: SubscriptionId) -> AppResult<()> {
    sqlx::query(
        "UPDATE event_subscriptions SET trigger_count = trigger_count + 1, last_triggered_at = $1 WHERE id = $2",
    )
    .bind(Utc::now())
    .bind(id.0)
    .execute(pool)
    .await?;
    Ok(())
}

fn notif_status_str(s: NotificationStatus) -> &'static str {
    match s {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Retrying => "retrying",
        NotificationStatus::Delivered => "delivered",
        NotificationStatus::Failed => "failed",
    }
}

fn row_to_notification(row: &sqlx::postgres::PgRow) -> AppResult<EventNotification> {
    let status_str: String = row.try_get("status")?;
    Ok(EventNotification {
        id: NotificationId(row.try_get("id")?),
        subscription_id: SubscriptionId(row.try_get("subscription_id")?),
        event_id: row.try_get("event_id")?,
        status: match status_str.as_str() {
            "retrying" => NotificationStatus::Retrying,
            "delivered" => NotificationStatus::Delivered,
            "failed" => NotificationStatus::Failed,
            _ => NotificationStatus::Pending,
        },
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        last_attempt_at: row.try_get("last_attempt_at")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        last_response_status: row.try_get::<Option<i32>, _>("last_response_status")?.map(|v| v as u16),
        created_at: row.try_get("created_at")?,
    })
}

/// Creates the notification if one doesn't already exist for this
/// (subscription, event) pair -- the unique index makes re-matching the
/// same event idempotent.
pub async fn create_notification(pool: &PgPool, subscription_id: SubscriptionId, event_id: Uuid) -> AppResult<NotificationId> {
    let id = NotificationId(Uuid::new_v4());
    sqlx::query(
        "INSERT INTO event_notifications (id, subscription_id, event_id, status, created_at)
         VALUES ($1,$2,$3,'pending',$4)
         ON CONFLICT (subscription_id, event_id) DO NOTHING",
    )
    .bind(id.0)
    .bind(subscription_id.0)
    .bind(event_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn list_deliverable(pool: &PgPool) -> AppResult<Vec<EventNotification>> {
    let rows = sqlx::query(
        "SELECT * FROM event_notifications
         WHERE status IN ('pending', 'retrying') AND (next_attempt_at IS NULL OR next_attempt_at <= now())",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_notification).collect()
}

pub async fn record_attempt(
    pool: &PgPool,
    id: NotificationId,
    status: NotificationStatus,
    response_status: Option<u16>,
    next_attempt_at: Option<chrono::DateTime<Utc>>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE event_notifications SET status = $1, attempts = attempts + 1, last_attempt_at = $2,
         next_attempt_at = $3, last_response_status = $4 WHERE id = $5",
    )
    .bind(notif_status_str(status))
    .bind(Utc::now())
    .bind(next_attempt_at)
    .bind(response_status.map(|v| v as i32))
    .bind(id.0)
    .execute(pool)
    .await?;
    Ok(())
}
