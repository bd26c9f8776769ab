pub mod client;
pub mod fake;
pub mod retry;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use client::NeoRpcClient;
pub use fake::FakeChainClient;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("logical error: {0}")]
    Logical(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl ChainError {
    /// Transient (retryable at the facade per §4.1) vs. logical (surfaces
    /// immediately).
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_) | ChainError::Decode(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub time: chrono::DateTime<chrono::Utc>,
    pub tx_hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub vm_state: String,
    pub gas_consumed: i64,
    pub reverted: bool,
    pub notifications: Vec<LogRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub contract: String,
    pub event_name: String,
    pub parameters: serde_json::Value,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_height: u64,
    pub block_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Order key used everywhere log records need a total order (spec §4.1:
/// "ordered by `(block_height, tx_index, log_index)`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogOrderKey {
    pub block_height: u64,
    pub tx_index: u32,
    pub log_index: u32,
}

/// Uniform facade over the chain RPC surface (spec §4.1). Object-safe via
/// `async_trait` so `NeoRpcClient` and `FakeChainClient` are interchangeable
/// behind a single `Arc<dyn ChainClient>`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_height(&self, deadline: Duration) -> Result<u64, ChainError>;

    async fn get_block(&self, height: u64, deadline: Duration) -> Result<BlockHeader, ChainError>;

    async fn get_transaction_receipt(
        &self,
        hash: &str,
        deadline: Duration,
    ) -> Result<TxReceipt, ChainError>;

    /// Restartable lazy stream of event records from `from_height` onward,
    /// ordered by `(block_height, tx_index, log_index)`.
    fn subscribe_logs(
        &self,
        contract: Option<String>,
        event: Option<String>,
        from_height: u64,
    ) -> BoxStream<'static, Result<LogRecord, ChainError>>;

    async fn submit_signed(&self, bytes: Vec<u8>, deadline: Duration) -> Result<String, ChainError>;

    async fn estimate_system_fee(&self, script: &[u8], deadline: Duration) -> Result<i64, ChainError>;
}
