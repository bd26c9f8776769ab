//! Enclave runtime (C4): one sandboxed JS invocation per call, executed on a
//! dedicated blocking pool. Generalizes the teacher's synchronous
//! extrinsic-building closures (`main.rs`'s request handlers calling
//! straight-line SDK code with no host-injected capabilities) into a
//! sandboxed execution boundary the rest of the platform can trust.

pub mod mock;
pub mod runtime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::wallet::EnclaveToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveRequest {
    pub source: String,
    pub params_json: serde_json::Value,
    pub secrets_map: HashMap<String, String>,
    pub deadline_ms: u64,
    pub memory_limit_mb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnclaveOutcome {
    Success,
    Error,
    Timeout,
    MemoryExceeded,
    SandboxViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveResult {
    pub status: EnclaveOutcome,
    pub result_json: Option<serde_json::Value>,
    pub error_msg: Option<String>,
    pub duration_ms: u64,
    pub console_log: Vec<String>,
}

/// Proof that a caller is inside one enclave invocation; minted by
/// `EnclaveRuntime::run` and handed down to anything that requires
/// capability-scoped access (e.g. `WalletStore::sign`, `SecretStore`'s
/// declared-secrets view).
pub struct EnclaveHandle {
    token: EnclaveToken,
}

impl EnclaveHandle {
    pub(crate) fn new(execution_id: Uuid) -> Self {
        Self {
            token: EnclaveToken(execution_id),
        }
    }

    pub fn token(&self) -> &EnclaveToken {
        &self.token
    }
}

#[async_trait]
pub trait EnclaveRuntime: Send + Sync {
    async fn run(&self, execution_id: Uuid, request: EnclaveRequest) -> EnclaveResult;
}
