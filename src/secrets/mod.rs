pub mod envelope;

use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::secrets_repo;
use crate::error::{AppError, AppResult, ErrorCode};
use crate::models::{DataKey, DataKeyId, Secret, SecretAccessAudit, SecretId, UserId};

/// Envelope-encrypted secret vault (C3). `master_key` is the key the
/// enclave releases to unwrap data keys; outside an execution context only
/// ciphertext ever touches the database.
pub struct SecretStore {
    pool: PgPool,
    master_key: [u8; envelope::KEY_LEN],
}

impl SecretStore {
    pub fn new(pool: PgPool, master_key: [u8; envelope::KEY_LEN]) -> Self {
        Self { pool, master_key }
    }

    pub async fn put(&self, owner: UserId, name: &str, plaintext: &[u8], expires_at: Option<chrono::DateTime<Utc>>) -> AppResult<SecretId> {
        let data_key_row = secrets_repo::active_data_key(&self.pool).await?;
        let data_key = envelope::unwrap_key(&self.master_key, &data_key_row.wrapped_key)
            .map_err(|_| AppError::new(ErrorCode::InternalError, "failed to unseal active data key"))?;

        let id = SecretId(Uuid::new_v4());
        let (ciphertext, nonce) = envelope::seal(&data_key, &id.0.to_string(), plaintext)
            .map_err(|_| AppError::new(ErrorCode::InternalError, "failed to seal secret"))?;

        let secret = Secret {
            id,
            owner,
            name: name.to_string(),
            ciphertext,
            nonce,
            data_key_id: data_key_row.id,
            metadata: serde_json::json!({}),
            expires_at,
        };
        secrets_repo::create(&self.pool, &secret).await?;
        Ok(id)
    }

    pub async fn list(&self, owner: UserId) -> AppResult<Vec<Secret>> {
        secrets_repo::list_for_owner(&self.pool, owner).await
    }

    pub async fn delete(&self, owner: UserId, name: &str) -> AppResult<()> {
        secrets_repo::delete(&self.pool, owner, name).await
    }

    /// Creates a new active data key; old keys remain usable for decrypting
    /// secrets sealed under them (spec §4.3).
    pub async fn rotate_data_key(&self) -> AppResult<DataKeyId> {
        let new_key = envelope::generate_data_key();
        let wrapped = envelope::wrap_key(&self.master_key, &new_key)
            .map_err(|_| AppError::new(ErrorCode::InternalError, "failed to wrap new data key"))?;
        let id = DataKeyId(Uuid::new_v4());
        secrets_repo::rotate_data_key(
            &self.pool,
            &DataKey {
                id,
                wrapped_key: wrapped,
                created_at: Utc::now(),
                active: true,
            },
        )
        .await?;
        Ok(id)
    }

    /// The sole path by which plaintext leaves the vault: one call per
    /// enclave execution, scoped exactly to `names`, auditing each name
    /// actually read (spec P5).
    pub async fn load_for_execution(
        &self,
        owner: UserId,
        names: &[String],
        execution_id: Uuid,
    ) -> AppResult<HashMap<String, String>> {
        let mut out = HashMap::new();
        let now = Utc::now();

        for name in names {
            let Some(secret) = secrets_repo::get_by_name(&self.pool, owner, name).await? else {
                continue;
            };
            if secret.is_expired(now) {
                continue;
            }

            let data_key_row = secrets_repo::get_data_key(&self.pool, secret.data_key_id).await?;
            let data_key = envelope::unwrap_key(&self.master_key, &data_key_row.wrapped_key)
                .map_err(|_| AppError::new(ErrorCode::InternalError, "failed to unseal data key"))?;
            let plaintext = envelope::open(&data_key, &secret.id.0.to_string(), &secret.ciphertext, &secret.nonce)
                .map_err(|_| AppError::new(ErrorCode::InternalError, "failed to open secret"))?;

            out.insert(
                name.clone(),
                String::from_utf8(plaintext)
                    .map_err(|_| AppError::new(ErrorCode::InternalError, "secret plaintext is not utf-8"))?,
            );

            secrets_repo::record_access(
                &self.pool,
                &SecretAccessAudit {
                    owner,
                    secret_id: secret.id,
                    execution_id,
                    accessed_at: now,
                },
            )
            .await?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_secret_not_loaded() {
        let secret = Secret {
            id: SecretId(Uuid::new_v4()),
            owner: UserId(Uuid::new_v4()),
            name: "api_key".into(),
            ciphertext: vec![],
            nonce: vec![],
            data_key_id: DataKeyId(Uuid::new_v4()),
            metadata: serde_json::json!({}),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        };
        assert!(secret.is_expired(Utc::now()));
    }
}
