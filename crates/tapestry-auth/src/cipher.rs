//! Encryption boundary for `integration_credential.encrypted_credentials`.
//!
//! Out of scope per the purpose statement: "the secret-encryption primitive."
//! What *is* in scope is the shape of the boundary the rest of the system
//! consumes: encrypt a credential map to an opaque blob at rest, decrypt it
//! back for the duration of a Token Manager's use. [`AesGcmCipher`] is a real,
//! working default a single-process deployment can run without an external
//! KMS; swapping in a managed one means implementing [`SecretCipher`].

use crate::{AuthError, AuthResult};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, credentials: &HashMap<String, String>) -> AuthResult<String>;
    fn decrypt(&self, blob: &str) -> AuthResult<HashMap<String, String>>;
}

/// AES-256-GCM with a random 96-bit nonce prepended to the ciphertext,
/// base64-encoded for storage in a text column.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// `key` must be exactly 32 bytes. Typically sourced from an env var or
    /// secret manager at process start, never from the database itself.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    pub fn from_env(var: &str) -> AuthResult<Self> {
        let raw = std::env::var(var)
            .map_err(|_| AuthError::Cipher(format!("{var} not set")))?;
        let decoded = STANDARD
            .decode(raw.trim())
            .map_err(|e| AuthError::Cipher(format!("invalid base64 in {var}: {e}")))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| AuthError::Cipher(format!("{var} must decode to 32 bytes")))?;
        Ok(Self::new(&key))
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    nonce: String,
    ciphertext: String,
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, credentials: &HashMap<String, String>) -> AuthResult<String> {
        let plaintext = serde_json::to_vec(credentials)
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        let envelope = Envelope {
            nonce: STANDARD.encode(nonce_bytes),
            ciphertext: STANDARD.encode(ciphertext),
        };
        serde_json::to_string(&envelope).map_err(|e| AuthError::Cipher(e.to_string()))
    }

    fn decrypt(&self, blob: &str) -> AuthResult<HashMap<String, String>> {
        let envelope: Envelope =
            serde_json::from_str(blob).map_err(|e| AuthError::Cipher(e.to_string()))?;
        let nonce_bytes = STANDARD
            .decode(envelope.nonce)
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        let ciphertext = STANDARD
            .decode(envelope.ciphertext)
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        serde_json::from_slice(&plaintext).map_err(|e| AuthError::Cipher(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> AesGcmCipher {
        AesGcmCipher::new(&[7u8; 32])
    }

    #[test]
    fn round_trips_a_credential_map() {
        let cipher = test_cipher();
        let mut creds = HashMap::new();
        creds.insert("access_token".to_string(), "secret-value".to_string());
        creds.insert("refresh_token".to_string(), "another-secret".to_string());

        let blob = cipher.encrypt(&creds).unwrap();
        assert!(!blob.contains("secret-value"));

        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted, creds);
    }

    #[test]
    fn distinct_encryptions_use_distinct_nonces() {
        let cipher = test_cipher();
        let mut creds = HashMap::new();
        creds.insert("a".to_string(), "b".to_string());

        let blob1 = cipher.encrypt(&creds).unwrap();
        let blob2 = cipher.encrypt(&creds).unwrap();
        assert_ne!(blob1, blob2);
    }
}
