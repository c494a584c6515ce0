//! Secret-value encryption using ChaCha20-Poly1305.
//!
//! Authenticated encryption: a corrupted or tampered ciphertext fails to
//! decrypt instead of producing garbage plaintext.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Cipher used to produce a [`SecretValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

/// One encrypted configuration value.
///
/// Produced once per plaintext write and never reused.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue {
    /// Ciphertext including the authentication tag.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    /// Nonce used for this encryption (unique per encryption).
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("iv_len", &self.iv.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Encrypts plaintext under `key` with a freshly generated nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<SecretValue> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SecretValue {
        ciphertext,
        iv: nonce_bytes.to_vec(),
        algorithm: Algorithm::ChaCha20Poly1305,
    })
}

/// Decrypts a [`SecretValue`] with the key that produced it.
pub fn decrypt(key: &DerivedKey, value: &SecretValue) -> CryptoResult<Vec<u8>> {
    if value.iv.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: value.iv.len(),
        });
    }
    if value.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption("data too short".to_string()));
    }

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&value.iv);

    cipher
        .decrypt(nonce, value.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}
