//! Key derivation and management.
//!
//! Operators may supply an encryption secret of any length; it is hashed
//! with SHA-256 to the fixed 256-bit key ChaCha20 needs.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// A derived encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Short, non-reversible identifier for this key (first 8 bytes of
    /// SHA-256 over the key, hex encoded). Safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives the encryption key from an operator secret.
///
/// The same secret always yields the same key, so values encrypted by one
/// process can be decrypted by the next one configured identically.
pub fn derive_key(secret: &str) -> CryptoResult<DerivedKey> {
    if secret.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "encryption secret must not be empty".to_string(),
        ));
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    Ok(DerivedKey::from_bytes(bytes))
}

/// Generates a random encryption key (tests, ephemeral deployments).
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    DerivedKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key("operator-secret").unwrap();
        let b = derive_key("operator-secret").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn any_length_secret_gives_full_key() {
        let short = derive_key("x").unwrap();
        let long = derive_key(&"y".repeat(4096)).unwrap();
        assert_eq!(short.as_bytes().len(), KEY_SIZE);
        assert_ne!(short.as_bytes(), long.as_bytes());
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(derive_key(""), Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let key = generate_random_key();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&hex::encode(key.as_bytes())));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let key = derive_key("s3cret").unwrap();
        assert_eq!(key.fingerprint(), key.clone().fingerprint());
        assert_eq!(key.fingerprint().len(), 16);
    }
}
