use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAccountId(pub Uuid);

/// One active signing key per `service` scope (spec §3: "one active signing
/// key per service scope"). `encrypted_private_key` is only ever decrypted
/// inside the enclave (C4), never by the wallet store itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccount {
    pub id: WalletAccountId,
    pub service: String,
    pub address: String,
    pub encrypted_private_key: Vec<u8>,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}
