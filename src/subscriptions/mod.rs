pub mod delivery;
pub mod matcher;

use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::bus::ChainEventBus;
use crate::db::subscriptions_repo;
use crate::models::BlockchainEvent;

/// Consumes C7's chain-event topic, matches against active subscriptions,
/// and creates an `EventNotification` per match (spec §4.8). Runs
/// independently of the delivery worker, which drains whatever notifications
/// this loop creates.
pub struct SubscriptionMatcher {
    pool: PgPool,
}

impl SubscriptionMatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn spawn(self, bus: &ChainEventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscription matcher lagged behind chain event bus");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(err) = self.match_event(&event).await {
                    tracing::error!(%err, "failed to match subscriptions for event");
                }
            }
        })
    }

    async fn match_event(&self, event: &BlockchainEvent) -> crate::error::AppResult<()> {
        let candidates = subscriptions_repo::list_active_matching(
            &self.pool,
            &event.contract,
            &event.event_name,
            event.block_number,
        )
        .await?;

        for subscription in candidates {
            if !matcher::matches(&subscription.parameter_tree, &event.parameters) {
                continue;
            }
            subscriptions_repo::create_notification(&self.pool, subscription.id, event.id.0).await?;
            subscriptions_repo::bump_trigger_count(&self.pool, subscription.id).await?;
        }
        Ok(())
    }
}
