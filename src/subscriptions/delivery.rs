//! Webhook delivery worker (C8, delivery half): drains notifications the
//! matcher created and POSTs the spec §4.8 payload, applying the
//! `attempts × RETRY_BACKOFF` schedule until a terminal state is reached.

use std::time::Duration as StdDuration;

use reqwest::Client;
use sqlx::PgPool;

use crate::db::{events_repo, subscriptions_repo};
use crate::error::AppResult;
use crate::models::{EventNotification, EventSubscription, NotificationStatus, SubscriptionType};

/// Spec §4.8 names the `attempts × RETRY_BACKOFF` schedule but not its
/// value or the retry ceiling; these mirror the chain facade's own
/// conservative defaults (spec §4.1's retry policy) scaled for a
/// human-facing webhook rather than an RPC call.
pub const MAX_RETRY_COUNT: u32 = 5;
pub const RETRY_BACKOFF: StdDuration = StdDuration::from_secs(2);
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

pub struct WebhookDeliveryWorker {
    pool: PgPool,
    http: Client,
}

impl WebhookDeliveryWorker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, http: Client::new() }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = self.drain_once().await {
                    tracing::error!(%err, "webhook delivery drain failed");
                }
            }
        })
    }

    async fn drain_once(&self) -> AppResult<()> {
        for notification in subscriptions_repo::list_deliverable(&self.pool).await? {
            if let Err(err) = self.attempt_delivery(notification).await {
                tracing::error!(%err, "webhook delivery attempt failed");
            }
        }
        Ok(())
    }

    /// One delivery attempt for a single notification. Exposed directly
    /// (like `Scheduler::tick_cron`) so a retry-then-deliver test can drive
    /// attempts one at a time instead of waiting on `POLL_INTERVAL`.
    pub async fn attempt_delivery(&self, notification: EventNotification) -> AppResult<()> {
        let subscription = subscriptions_repo::get(&self.pool, notification.subscription_id).await?;
        if subscription.subscription_type != SubscriptionType::Webhook {
            // Email/in-app/automation delivery is out of scope for this
            // worker; mark delivered so it doesn't loop forever through the
            // deliverable queue.
            subscriptions_repo::record_attempt(
                &self.pool,
                notification.id,
                NotificationStatus::Delivered,
                None,
                None,
            )
            .await?;
            return Ok(());
        }
        let Some(url) = subscription.webhook_url.clone() else {
            subscriptions_repo::record_attempt(
                &self.pool,
                notification.id,
                NotificationStatus::Failed,
                None,
                None,
            )
            .await?;
            return Ok(());
        };

        let event = events_repo::get(&self.pool, crate::models::BlockchainEventId(notification.event_id)).await?;
        let payload = build_payload(&subscription, &notification, &event);

        let next_attempt = notification.attempts + 1;
        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                subscriptions_repo::record_attempt(
                    &self.pool,
                    notification.id,
                    NotificationStatus::Delivered,
                    Some(response.status().as_u16()),
                    None,
                )
                .await
            }
            Ok(response) if response.status().as_u16() == 410 => {
                subscriptions_repo::record_attempt(
                    &self.pool,
                    notification.id,
                    NotificationStatus::Failed,
                    Some(410),
                    None,
                )
                .await
            }
            Ok(response) => {
                let status = response.status().as_u16();
                self.record_retry_or_fail(notification.id, next_attempt, Some(status)).await
            }
            Err(_) => self.record_retry_or_fail(notification.id, next_attempt, None).await,
        }
    }

    async fn record_retry_or_fail(
        &self,
        id: crate::models::NotificationId,
        next_attempt: u32,
        response_status: Option<u16>,
    ) -> AppResult<()> {
        if next_attempt >= MAX_RETRY_COUNT {
            subscriptions_repo::record_attempt(&self.pool, id, NotificationStatus::Failed, response_status, None).await
        } else {
            let delay = RETRY_BACKOFF * next_attempt;
            let next_attempt_at = chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            subscriptions_repo::record_attempt(
                &self.pool,
                id,
                NotificationStatus::Retrying,
                response_status,
                Some(next_attempt_at),
            )
            .await
        }
    }
}

fn build_payload(
    subscription: &EventSubscription,
    notification: &EventNotification,
    event: &crate::models::BlockchainEvent,
) -> serde_json::Value {
    serde_json::json!({
        "subscription_id": subscription.id.0,
        "event_id": notification.event_id,
        "contract": event.contract,
        "event_name": event.event_name,
        "parameters": event.parameters,
        "tx_hash": event.tx_hash,
        "block_number": event.block_number,
        "block_hash": event.block_hash,
        "timestamp": event.timestamp,
    })
}
