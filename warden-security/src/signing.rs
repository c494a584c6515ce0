//! HMAC-SHA256 signing and verification of plugin sources.
//!
//! The MAC covers `pluginId:version:timestamp:` followed by the raw source
//! bytes. The timestamp travels inside the signature, so verification
//! recomputes over exactly the string that was signed.

use crate::error::{SecurityError, SecurityResult};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use warden_types::PluginId;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Provenance stamp for one plugin source at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSignature {
    /// Lowercase hex HMAC-SHA256.
    pub signature: String,
    /// RFC 3339 UTC time of signing, as hashed.
    pub timestamp: String,
    pub version: String,
}

/// Holds the operator signing key.
pub struct PluginSigner {
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PluginSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl PluginSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> SecurityResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SecurityError::EmptySigningKey);
        }
        Ok(Self {
            key: Zeroizing::new(secret.to_vec()),
        })
    }

    fn mac(&self, source: &[u8], plugin_id: &PluginId, version: &str, timestamp: &str) -> SecurityResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| SecurityError::Hmac(e.to_string()))?;
        mac.update(format!("{plugin_id}:{version}:{timestamp}:").as_bytes());
        mac.update(source);
        Ok(mac)
    }

    /// Signs `source` as `plugin_id` at `version`, stamped with the current time.
    pub fn sign(
        &self,
        source: &[u8],
        plugin_id: &PluginId,
        version: &str,
    ) -> SecurityResult<PluginSignature> {
        let timestamp = canonical_timestamp(Utc::now());
        let tag = self
            .mac(source, plugin_id, version, &timestamp)?
            .finalize()
            .into_bytes();
        debug!(plugin_id = %plugin_id, version, "plugin source signed");
        Ok(PluginSignature {
            signature: hex::encode(tag),
            timestamp,
            version: version.to_string(),
        })
    }

    /// Checks `signature` against `source`, in constant time.
    ///
    /// Returns `false` for any mismatch, including a version other than the
    /// one the signature was issued for, a malformed hex digest, or a
    /// timestamp not in the exact form [`Self::sign`] emits. The timestamp
    /// is part of the MAC input, so a free-form one could absorb a prefix
    /// of the signed source.
    pub fn verify(
        &self,
        source: &[u8],
        plugin_id: &PluginId,
        version: &str,
        signature: &PluginSignature,
    ) -> bool {
        if signature.version != version || !is_canonical_timestamp(&signature.timestamp) {
            return false;
        }
        let Ok(expected) = hex::decode(&signature.signature) else {
            return false;
        };
        match self.mac(source, plugin_id, version, &signature.timestamp) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    /// Like [`Self::verify`] but as a `Result`, for `?` call sites.
    pub fn ensure_valid(
        &self,
        source: &[u8],
        plugin_id: &PluginId,
        version: &str,
        signature: &PluginSignature,
    ) -> SecurityResult<()> {
        if self.verify(source, plugin_id, version, signature) {
            Ok(())
        } else {
            Err(SecurityError::SignatureInvalid)
        }
    }
}

fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_canonical_timestamp(timestamp: &str) -> bool {
    DateTime::parse_from_rfc3339(timestamp)
        .is_ok_and(|at| canonical_timestamp(at.with_timezone(&Utc)) == timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> PluginId {
        PluginId::parse("stripe").unwrap()
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(PluginSigner::new(""), Err(SecurityError::EmptySigningKey)));
    }

    #[test]
    fn debug_hides_key() {
        let signer = PluginSigner::new("super-secret").unwrap();
        let shown = format!("{signer:?}");
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("[REDACTED]"));
    }

    #[test]
    fn malformed_hex_fails_closed() {
        let signer = PluginSigner::new("k").unwrap();
        let mut sig = signer.sign(b"src", &plugin(), "1.0.0").unwrap();
        sig.signature = "zz".into();
        assert!(!signer.verify(b"src", &plugin(), "1.0.0", &sig));
    }
}
