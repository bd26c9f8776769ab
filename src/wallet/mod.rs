//! Wallet store (C2). Generalizes the teacher's single dev sr25519 keypair
//! (`Pair::from_string("//Alice", ...)`) into a per-service, at-rest
//! encrypted key held behind the enclave boundary: outside the enclave only
//! `get_public_key` is reachable, `sign` requires an `EnclaveToken` minted by
//! `EnclaveRuntime::run`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::WalletAccount;
use crate::secrets::envelope;

/// Capability token proving the caller is inside an enclave execution. Only
/// `EnclaveRuntime::run` can construct one (see `src/enclave/mod.rs`).
pub struct EnclaveToken(pub(crate) Uuid);

pub struct WalletStore {
    pool: PgPool,
    master_key: [u8; envelope::KEY_LEN],
}

impl WalletStore {
    pub fn new(pool: PgPool, master_key: [u8; envelope::KEY_LEN]) -> Self {
        Self { pool, master_key }
    }

    pub async fn get_public_key(&self, service: &str) -> AppResult<String> {
        let account = crate::db::wallet_repo::get_active(&self.pool, service).await?;
        Ok(account.public_key)
    }

    pub async fn provision(&self, account: WalletAccount) -> AppResult<()> {
        crate::db::wallet_repo::set_active(&self.pool, &account).await
    }

    /// Only callable with an `EnclaveToken`, i.e. from inside C4. Decrypts
    /// the private key in memory for the duration of the signature and
    /// never returns it to the caller.
    pub async fn sign(
        &self,
        service: &str,
        payload: &[u8],
        _token: &EnclaveToken,
    ) -> AppResult<Vec<u8>> {
        let account = crate::db::wallet_repo::get_active(&self.pool, service).await?;
        let private_key = envelope::unwrap_key(&self.master_key, &account.encrypted_private_key)
            .map_err(|_| {
                crate::error::AppError::new(
                    crate::error::ErrorCode::InternalError,
                    "failed to unseal signing key",
                )
            })?;
        Ok(sign_with_key(&private_key, payload))
    }
}

/// Placeholder Neo N3 ECDSA-over-secp256r1 signature hook; the real
/// implementation lives behind the enclave attestation boundary (§1: "the
/// enclave attestation handshake [is] treated as a boolean capability" and
/// thus out of scope here).
fn sign_with_key(key: &[u8; 32], payload: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(payload);
    hasher.finalize().to_vec()
}
