//! P4 (at-most-once firing) at the scheduler layer: two `Scheduler`
//! instances -- standing in for a crash-restart -- independently compute
//! the same cron `next_fire` instant from the same `VirtualClock` start,
//! per spec §8 "restart scheduler mid-cycle, confirm only one invocation
//! event fires". The dedup table (shared via the pool) must let only the
//! first of the two `tick_cron` calls through.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use neo_oracle_platform::bus::{ChainEventBus, PriceEventBus};
use neo_oracle_platform::models::{FunctionId, Trigger, TriggerConfig, TriggerId, TriggerStatus, UserId};
use neo_oracle_platform::scheduler::{Scheduler, VirtualClock};
use tokio::sync::mpsc;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn cron_trigger() -> Trigger {
    Trigger {
        id: TriggerId(Uuid::new_v4()),
        owner: UserId(Uuid::new_v4()),
        function_id: FunctionId(Uuid::new_v4()),
        config: TriggerConfig::Cron {
            schedule: "*/2 * * * * *".to_string(),
        },
        status: TriggerStatus::Active,
        created_at: t0(),
    }
}

#[sqlx::test]
async fn restart_mid_cycle_fires_exactly_once(pool: sqlx::PgPool) {
    let trigger = cron_trigger();
    let (tx, mut rx) = mpsc::channel(8);

    let clock1 = Arc::new(VirtualClock::new(t0()));
    let scheduler1 = Scheduler::new(
        pool.clone(),
        ChainEventBus::new(),
        PriceEventBus::new(),
        tx.clone(),
        clock1.clone(),
    );
    scheduler1.register(trigger.clone()).await;

    let clock2 = Arc::new(VirtualClock::new(t0()));
    let scheduler2 = Scheduler::new(
        pool.clone(),
        ChainEventBus::new(),
        PriceEventBus::new(),
        tx.clone(),
        clock2.clone(),
    );
    scheduler2.register(trigger.clone()).await;

    // Both schedulers registered against the same clock start, so they
    // agree on `next_fire`. Advance each clock past it and tick.
    let next = clock1.advance(chrono::Duration::seconds(2));
    scheduler1.tick_cron(next).await;

    let next2 = clock2.advance(chrono::Duration::seconds(2));
    scheduler2.tick_cron(next2).await;

    drop(tx);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 1, "a duplicate restart must not double-fire the cron trigger");
    assert_eq!(events[0].trigger_id.0, trigger.id.0);
}
