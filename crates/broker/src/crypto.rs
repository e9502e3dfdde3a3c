//! Field-level encryption for persisted credentials.
//!
//! Access and refresh tokens are encrypted with AES-256-GCM before they
//! touch the store. The wire form is a base64-encoded JSON envelope
//! carrying the nonce, ciphertext, and algorithm tag, so payloads stay
//! self-describing and survive key-rotation tooling.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Serialized encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
}

/// AES-256-GCM cipher for individual credential fields.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").field("key", &"[REDACTED]").finish()
    }
}

impl FieldCipher {
    /// Create a cipher from a raw 32-byte key.
    ///
    /// # Errors
    /// Returns [`BrokerError::Crypto`] when the key is not exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(BrokerError::Crypto(
                "encryption key must be exactly 32 bytes".to_string(),
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| BrokerError::Crypto(format!("failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded 32-byte key, the form the key
    /// is injected through configuration.
    ///
    /// # Errors
    /// Returns [`BrokerError::Crypto`] when the encoding or length is wrong.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let key = BASE64
            .decode(encoded)
            .map_err(|e| BrokerError::Crypto(format!("invalid base64 key: {e}")))?;
        Self::new(&key)
    }

    /// Generate a random 32-byte key, base64-encoded for configuration.
    #[must_use]
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Encrypt a field value into its base64 envelope form.
    ///
    /// # Errors
    /// Returns [`BrokerError::Crypto`] on cipher failure.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext.as_bytes())
            .map_err(|e| BrokerError::Crypto(format!("encryption failed: {e}")))?;

        let payload = EncryptedData {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            algorithm: "AES-256-GCM".to_string(),
        };
        let serialized = serde_json::to_vec(&payload)
            .map_err(|e| BrokerError::Crypto(format!("payload serialization failed: {e}")))?;
        Ok(BASE64.encode(serialized))
    }

    /// Decrypt a base64 envelope back into the field value.
    ///
    /// # Errors
    /// Returns [`BrokerError::Crypto`] when the envelope is malformed or the
    /// key does not match.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| BrokerError::Crypto(format!("base64 decode failed: {e}")))?;
        let payload: EncryptedData = serde_json::from_slice(&decoded)
            .map_err(|e| BrokerError::Crypto(format!("malformed encrypted payload: {e}")))?;

        if payload.algorithm != "AES-256-GCM" {
            return Err(BrokerError::Crypto(format!(
                "unsupported algorithm: {}",
                payload.algorithm
            )));
        }
        let nonce: [u8; 12] = payload
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| BrokerError::Crypto("nonce must be exactly 12 bytes".to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(&Nonce::from(nonce), payload.ciphertext.as_ref())
            .map_err(|e| BrokerError::Crypto(format!("decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| BrokerError::Crypto(format!("decrypted field is not utf-8: {e}")))
    }
}

fn generate_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    //! Unit tests for field encryption.
    use super::*;

    #[test]
    fn generated_key_decodes_to_32_bytes() {
        let key = FieldCipher::generate_key();
        assert_eq!(BASE64.decode(key).unwrap().len(), 32);
    }

    #[test]
    fn rejects_short_key() {
        assert!(FieldCipher::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn encrypt_and_decrypt_round_trip() {
        let cipher = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();

        let encoded = cipher.encrypt("ya29.access-token").unwrap();
        assert_ne!(encoded, "ya29.access-token");
        assert_eq!(cipher.decrypt(&encoded).unwrap(), "ya29.access-token");
    }

    #[test]
    fn two_encryptions_of_the_same_value_differ() {
        let cipher = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();
        assert_ne!(cipher.encrypt("tok").unwrap(), cipher.encrypt("tok").unwrap());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();
        let b = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();

        let encoded = a.encrypt("secret").unwrap();
        assert!(matches!(b.decrypt(&encoded), Err(BrokerError::Crypto(_))));
    }

    #[test]
    fn garbage_envelope_is_a_crypto_error() {
        let cipher = FieldCipher::from_base64(&FieldCipher::generate_key()).unwrap();
        assert!(matches!(cipher.decrypt("not base64!"), Err(BrokerError::Crypto(_))));
    }
}
