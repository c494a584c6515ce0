use proptest::prelude::*;
use warden_security::{PluginSignature, PluginSigner, SecurityError};
use warden_types::PluginId;

fn signer() -> PluginSigner {
    PluginSigner::new("operator-signing-key").unwrap()
}

fn plugin() -> PluginId {
    PluginId::parse("stripe-payments").unwrap()
}

const SOURCE: &[u8] = b"export default function Pay() { return null; }";

#[test]
fn sign_then_verify() {
    let s = signer();
    let sig = s.sign(SOURCE, &plugin(), "2.1.0").unwrap();
    assert_eq!(sig.version, "2.1.0");
    assert_eq!(sig.signature.len(), 64);
    assert!(s.verify(SOURCE, &plugin(), "2.1.0", &sig));
    assert!(s.ensure_valid(SOURCE, &plugin(), "2.1.0", &sig).is_ok());
}

#[test]
fn other_plugin_or_version_fails() {
    let s = signer();
    let sig = s.sign(SOURCE, &plugin(), "2.1.0").unwrap();
    let other = PluginId::parse("paypal").unwrap();
    assert!(!s.verify(SOURCE, &other, "2.1.0", &sig));
    assert!(!s.verify(SOURCE, &plugin(), "2.1.1", &sig));
}

#[test]
fn other_key_fails() {
    let sig = signer().sign(SOURCE, &plugin(), "1.0.0").unwrap();
    let other = PluginSigner::new("different-key").unwrap();
    assert!(!other.verify(SOURCE, &plugin(), "1.0.0", &sig));
    assert!(matches!(
        other.ensure_valid(SOURCE, &plugin(), "1.0.0", &sig),
        Err(SecurityError::SignatureInvalid)
    ));
}

#[test]
fn edited_timestamp_fails() {
    let s = signer();
    let mut sig = s.sign(SOURCE, &plugin(), "1.0.0").unwrap();
    sig.timestamp = "2020-01-01T00:00:00.000Z".into();
    assert!(!s.verify(SOURCE, &plugin(), "1.0.0", &sig));
}

#[test]
fn source_prefix_moved_into_timestamp_fails() {
    let s = signer();
    let source = "export const a = { x: 1 }; export default function evil() {}";
    let sig = s.sign(source.as_bytes(), &plugin(), "1.0.0").unwrap();

    let (head, tail) = source.split_once(':').unwrap();
    let mut forged = sig.clone();
    forged.timestamp = format!("{}:{head}", sig.timestamp);
    assert!(!s.verify(tail.as_bytes(), &plugin(), "1.0.0", &forged));
}

#[test]
fn non_canonical_timestamp_fails() {
    let s = signer();
    let mut sig = s.sign(SOURCE, &plugin(), "1.0.0").unwrap();
    // Same instant, different spelling.
    sig.timestamp = sig.timestamp.replace('Z', "+00:00");
    assert!(!s.verify(SOURCE, &plugin(), "1.0.0", &sig));
}

#[test]
fn signature_serializes_as_plain_json() {
    let sig = signer().sign(SOURCE, &plugin(), "1.0.0").unwrap();
    let json = serde_json::to_string(&sig).unwrap();
    let back: PluginSignature = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sig);
}

proptest! {
    #[test]
    fn any_single_byte_change_breaks_verification(
        source in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let s = signer();
        let sig = s.sign(&source, &plugin(), "1.0.0").unwrap();
        prop_assert!(s.verify(&source, &plugin(), "1.0.0", &sig));

        let mut tampered = source.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        prop_assert!(!s.verify(&tampered, &plugin(), "1.0.0", &sig));
    }
}
