//! Envelope encryption primitives: `ciphertext = AEAD(data_key, plaintext,
//! aad=secret_id)` (spec §4.3), with data keys wrapped by a master key.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
}

/// Generates a fresh 256-bit data key.
pub fn generate_data_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Wraps a data key with the master key (itself an AES-256-GCM key).
pub fn wrap_key(master_key: &[u8; KEY_LEN], data_key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(nonce, data_key.as_ref())
        .map_err(|_| CryptoError::Encrypt)?;
    let mut out = nonce_bytes.to_vec();
    out.append(&mut ciphertext);
    Ok(out)
}

/// Unwraps a data key previously wrapped with `wrap_key`.
pub fn unwrap_key(master_key: &[u8; KEY_LEN], wrapped: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    if wrapped.len() < NONCE_LEN {
        return Err(CryptoError::Decrypt);
    }
    let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;
    plaintext.try_into().map_err(|_| CryptoError::Decrypt)
}

/// Seals a secret's plaintext under its data key, binding `secret_id` as AAD
/// so a ciphertext can never be decrypted under a different secret's id.
pub fn seal(data_key: &[u8; KEY_LEN], secret_id: &str, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(data_key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: secret_id.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;
    Ok((ciphertext, nonce_bytes.to_vec()))
}

pub fn open(
    data_key: &[u8; KEY_LEN],
    secret_id: &str,
    ciphertext: &[u8],
    nonce: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(data_key));
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: secret_id.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = generate_data_key();
        let (ct, nonce) = seal(&key, "secret-1", b"top secret value").unwrap();
        let pt = open(&key, "secret-1", &ct, &nonce).unwrap();
        assert_eq!(pt, b"top secret value");
    }

    #[test]
    fn wrong_aad_fails() {
        let key = generate_data_key();
        let (ct, nonce) = seal(&key, "secret-1", b"value").unwrap();
        assert!(open(&key, "secret-2", &ct, &nonce).is_err());
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let master = generate_data_key();
        let data_key = generate_data_key();
        let wrapped = wrap_key(&master, &data_key).unwrap();
        let unwrapped = unwrap_key(&master, &wrapped).unwrap();
        assert_eq!(unwrapped, data_key);
    }
}
