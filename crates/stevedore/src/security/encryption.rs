//! At-rest encryption for object content
//!
//! AES-256-GCM with a fresh 96-bit nonce per object, prepended to the
//! ciphertext. When encryption is disabled both operations pass the input
//! through unchanged, so callers must not assume a particular framing.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use bytes::Bytes;

use super::SecurityError;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Length in bytes of the raw key material.
pub const KEY_LEN: usize = 32;

pub struct Encryptor {
    cipher: Option<Aes256Gcm>,
}

impl Encryptor {
    /// Pass-through encryptor used when at-rest encryption is disabled.
    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    /// Build an encryptor from 32 bytes of key material.
    pub fn from_key(key: &[u8]) -> Result<Self, SecurityError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            SecurityError::InvalidKeyMaterial(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            ))
        })?;
        Ok(Self {
            cipher: Some(cipher),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt object content, producing `nonce || ciphertext`.
    pub fn encrypt(&self, data: Bytes) -> Result<Bytes, SecurityError> {
        let Some(cipher) = &self.cipher else {
            return Ok(data);
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, data.as_ref())
            .map_err(|e| SecurityError::Encryption(e.to_string()))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&ciphertext);
        Ok(Bytes::from(framed))
    }

    /// Decrypt `nonce || ciphertext` framing produced by [`Self::encrypt`].
    pub fn decrypt(&self, data: Bytes) -> Result<Bytes, SecurityError> {
        let Some(cipher) = &self.cipher else {
            return Ok(data);
        };

        if data.len() < NONCE_LEN {
            return Err(SecurityError::Encryption(
                "ciphertext shorter than nonce prefix".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| SecurityError::Encryption(e.to_string()))?;
        Ok(Bytes::from(plaintext))
    }
}
