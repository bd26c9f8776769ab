use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataKeyId(pub Uuid);

/// A data key wrapped by the enclave's master key. Rotation creates a new
/// active key; old keys remain usable for decrypting secrets sealed under them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataKey {
    pub id: DataKeyId,
    pub wrapped_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// `ciphertext = AEAD(data_key, plaintext, aad=secret_id)`. Plaintext never
/// leaves the secret store except into one enclave execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    pub owner: UserId,
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub data_key_id: DataKeyId,
    pub metadata: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }
}

/// One row per `load_for_execution` read, per spec §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretAccessAudit {
    pub owner: UserId,
    pub secret_id: SecretId,
    pub execution_id: Uuid,
    pub accessed_at: DateTime<Utc>,
}
