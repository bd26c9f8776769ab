//! In-memory `ChainClient` for tests: a scripted chain with deterministic
//! blocks and receipts, driven by a `VirtualClock`-compatible test harness
//! rather than real time or network I/O.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{BlockHeader, ChainClient, ChainError, LogRecord, TxReceipt};

#[derive(Default)]
struct State {
    blocks: Vec<BlockHeader>,
    receipts: HashMap<String, TxReceipt>,
    submitted: Vec<Vec<u8>>,
    next_hash_counter: u64,
}

pub struct FakeChainClient {
    state: Mutex<State>,
}

impl FakeChainClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn push_block(&self, block: BlockHeader) {
        self.state.lock().unwrap().blocks.push(block);
    }

    pub fn set_receipt(&self, hash: &str, receipt: TxReceipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(hash.to_string(), receipt);
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().submitted.clone()
    }
}

impl Default for FakeChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn get_height(&self, _deadline: Duration) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks.len() as u64)
    }

    async fn get_block(&self, height: u64, _deadline: Duration) -> Result<BlockHeader, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(height as usize)
            .cloned()
            .ok_or_else(|| ChainError::Logical(format!("no block at height {height}")))
    }

    async fn get_transaction_receipt(
        &self,
        hash: &str,
        _deadline: Duration,
    ) -> Result<TxReceipt, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .receipts
            .get(hash)
            .cloned()
            .ok_or_else(|| ChainError::Logical(format!("no receipt for {hash}")))
    }

    fn subscribe_logs(
        &self,
        contract: Option<String>,
        event: Option<String>,
        from_height: u64,
    ) -> BoxStream<'static, Result<LogRecord, ChainError>> {
        let records: Vec<LogRecord> = self
            .state
            .lock()
            .unwrap()
            .blocks
            .iter()
            .filter(|b| b.height >= from_height)
            .flat_map(|b| b.tx_hashes.iter())
            .filter_map(|tx_hash| self.state.lock().unwrap().receipts.get(tx_hash).cloned())
            .flat_map(|r| r.notifications)
            .filter(|n| contract.as_deref().map(|c| c == n.contract).unwrap_or(true))
            .filter(|n| event.as_deref().map(|e| e == n.event_name).unwrap_or(true))
            .collect();

        stream::iter(records.into_iter().map(Ok)).boxed()
    }

    async fn submit_signed(&self, bytes: Vec<u8>, _deadline: Duration) -> Result<String, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.next_hash_counter += 1;
        let hash = format!("0xfake{:016x}", state.next_hash_counter);
        state.submitted.push(bytes);
        Ok(hash)
    }

    async fn estimate_system_fee(&self, _script: &[u8], _deadline: Duration) -> Result<i64, ChainError> {
        Ok(1_000_000)
    }
}
