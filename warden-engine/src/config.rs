//! Engine configuration, read from `warden.toml`.
//!
//! Operator secrets are never part of this file; they arrive separately as
//! [`OperatorSecrets`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};
use warden_sandbox::SandboxConfig;
use warden_security::{Environment, ValidatorConfig};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub environment: Environment,
    pub sandbox: SandboxConfig,
    pub security: ValidatorConfig,
}

impl EngineConfig {
    /// Loads configuration from `path`. Falls back to defaults with a
    /// warning when the file is missing or does not parse.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No engine config found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => {
                    info!("Loaded engine config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse engine config {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read engine config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Secrets held by the operator: the configuration encryption secret and
/// the plugin signing secret. Wiped from memory on drop.
pub struct OperatorSecrets {
    encryption_secret: Zeroizing<String>,
    signing_secret: Zeroizing<String>,
}

impl OperatorSecrets {
    pub fn new(encryption_secret: impl Into<String>, signing_secret: impl Into<String>) -> Self {
        Self {
            encryption_secret: Zeroizing::new(encryption_secret.into()),
            signing_secret: Zeroizing::new(signing_secret.into()),
        }
    }

    pub fn encryption_secret(&self) -> &str {
        &self.encryption_secret
    }

    pub fn signing_secret(&self) -> &str {
        &self.signing_secret
    }
}

impl fmt::Debug for OperatorSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSecrets")
            .field("encryption_secret", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .finish()
    }
}
