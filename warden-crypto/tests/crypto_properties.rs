//! Property-based tests for the crypto module.
//!
//! These tests verify security properties that must always hold:
//! - Encryption is reversible with the correct key
//! - Two encryptions of the same plaintext never collide
//! - Tampering is detected

use warden_crypto::{decrypt, encrypt, generate_random_key, CryptoVault, SecretCipher};
use proptest::prelude::*;

fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

proptest! {
    /// decrypt(encrypt(s)) == s for every string.
    #[test]
    fn vault_roundtrip_preserves_string(plaintext in any::<String>()) {
        let vault = CryptoVault::with_key(generate_random_key());
        let value = vault.encrypt(&plaintext).unwrap();
        prop_assert_eq!(vault.decrypt(&value).unwrap(), plaintext);
    }

    /// Fresh IV on every encryption.
    #[test]
    fn repeated_encryption_never_repeats_ciphertext(plaintext in any::<String>()) {
        let vault = CryptoVault::with_key(generate_random_key());
        let a = vault.encrypt(&plaintext).unwrap();
        let b = vault.encrypt(&plaintext).unwrap();
        prop_assert_ne!(&a.iv, &b.iv);
        prop_assert_ne!(a.ciphertext, b.ciphertext);
    }

    /// Flipping any single ciphertext bit is detected.
    #[test]
    fn any_bit_flip_is_detected(
        plaintext in plaintext_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = generate_random_key();
        let mut value = encrypt(&key, &plaintext).unwrap();
        let idx = position.index(value.ciphertext.len());
        value.ciphertext[idx] ^= 1 << bit;
        prop_assert!(decrypt(&key, &value).is_err());
    }
}
