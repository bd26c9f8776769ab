//! Background poll loop (spec §4.5): periodically inspects every
//! non-terminal transaction and advances it along the state machine.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::models::transaction::TxStatus;

use super::manager::{TransactionManager, POLL_INTERVAL};

pub fn spawn(manager: Arc<TransactionManager>, pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run(manager, pool, POLL_INTERVAL).await })
}

async fn run(manager: Arc<TransactionManager>, pool: PgPool, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let pending = match crate::db::transactions_repo::list_non_terminal(&pool).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(%err, "failed to list non-terminal transactions");
                continue;
            }
        };

        for tx in pending {
            let manager = manager.clone();
            tokio::spawn(async move {
                let result = match tx.status {
                    TxStatus::Created => manager.retry_submit(&tx).await,
                    TxStatus::Submitted => manager.advance_to_pending(tx.id).await,
                    TxStatus::Pending => manager.poll_pending(&tx).await,
                    TxStatus::Confirming => manager.poll_confirming(&tx).await,
                    _ => Ok(tx.clone()),
                };
                if let Err(err) = result {
                    tracing::warn!(tx_id = %tx.id.0, %err, "poll tick failed for transaction");
                }
            });
        }
    }
}
