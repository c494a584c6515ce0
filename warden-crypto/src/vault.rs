//! Key-owning encryption service and the trait consumers depend on.
//!
//! ConfigStore holds an `Arc<dyn SecretCipher>` and never sees raw keys.
//! The derived key is read-only after construction, so one vault can be
//! shared across every task without locking.

use crate::cipher::{self, SecretValue};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, DerivedKey};

/// Encrypts and decrypts individual secret strings.
pub trait SecretCipher: Send + Sync {
    /// Encrypts `plaintext`, producing a value with a fresh nonce.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<SecretValue>;

    /// Decrypts a value previously produced by `encrypt`.
    fn decrypt(&self, value: &SecretValue) -> CryptoResult<String>;
}

/// Holds the process-lifetime encryption key.
#[derive(Debug)]
pub struct CryptoVault {
    key: DerivedKey,
}

impl CryptoVault {
    /// Derives the vault key from an operator secret of any length.
    pub fn from_secret(secret: &str) -> CryptoResult<Self> {
        Ok(Self {
            key: derive_key(secret)?,
        })
    }

    /// Wraps an already-derived key.
    pub fn with_key(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Fingerprint of the active key (see [`DerivedKey::fingerprint`]).
    pub fn fingerprint(&self) -> String {
        self.key.fingerprint()
    }
}

impl SecretCipher for CryptoVault {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<SecretValue> {
        cipher::encrypt(&self.key, plaintext.as_bytes())
    }

    fn decrypt(&self, value: &SecretValue) -> CryptoResult<String> {
        let bytes = cipher::decrypt(&self.key, value)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
    }
}
