//! Encryption layer for Warden.
//!
//! Secrets in tenant plugin configuration are encrypted field-by-field with
//! ChaCha20-Poly1305 under a key derived once, at process start, from an
//! operator-supplied secret. Each encryption draws a fresh random nonce, so
//! encrypting the same plaintext twice never yields the same ciphertext.
//!
//! Consumers depend on [`SecretCipher`]; only [`CryptoVault`] ever holds
//! key material.

mod cipher;
mod error;
mod key;
mod vault;

pub use cipher::{decrypt, encrypt, Algorithm, SecretValue, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, DerivedKey, KEY_SIZE};
pub use vault::{CryptoVault, SecretCipher};
