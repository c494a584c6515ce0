//! Error types for the engine facade.
//!
//! Every failure maps onto one [`ErrorKind`] and has a sanitized
//! [`EngineError::public_message`] that is safe to hand to callers: no
//! ciphertext, keys or plugin stack traces.

use crate::bundle::BundleError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use warden_audit::AuditError;
use warden_config::ConfigError;
use warden_crypto::CryptoError;
use warden_sandbox::{GENERIC_FAILURE, SandboxError};
use warden_security::SecurityError;
use warden_types::{PluginId, TenantId};

pub type EngineResult<T> = Result<T, EngineError>;

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Disabled,
    ValidationFailed,
    DecryptionFailed,
    SecurityRejected,
    SignatureInvalid,
    Timeout,
    ExecutionFailed,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "NOT_FOUND",
            Self::Disabled => "DISABLED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::SecurityRejected => "SECURITY_REJECTED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Timeout => "TIMEOUT",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Storage => "STORAGE",
        })
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("plugin {plugin_id} is not installed for tenant {tenant_id}")]
    NotInstalled {
        tenant_id: TenantId,
        plugin_id: PluginId,
    },

    #[error("plugin {plugin_id} is disabled for tenant {tenant_id}")]
    Disabled {
        tenant_id: TenantId,
        plugin_id: PluginId,
    },

    /// Static analysis found at least one risk.
    #[error("plugin code rejected: {}", .0.join("; "))]
    SecurityRejected(Vec<String>),

    /// Signed bundles are required and this one carries no signature.
    #[error("plugin {0} bundle is not signed")]
    Unsigned(PluginId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInstalled { .. } => ErrorKind::NotFound,
            Self::Disabled { .. } => ErrorKind::Disabled,
            Self::SecurityRejected(_) => ErrorKind::SecurityRejected,
            Self::Unsigned(_) => ErrorKind::SignatureInvalid,
            Self::Config(e) => match e {
                ConfigError::NotFound { .. } => ErrorKind::NotFound,
                ConfigError::ValidationFailed(_) => ErrorKind::ValidationFailed,
                ConfigError::Crypto(c) if c.is_decryption_failure() => ErrorKind::DecryptionFailed,
                ConfigError::Crypto(_)
                | ConfigError::Conflict { .. }
                | ConfigError::Storage(_)
                | ConfigError::Serialization(_) => ErrorKind::Storage,
            },
            Self::Audit(_) => ErrorKind::Storage,
            Self::Security(_) => ErrorKind::SignatureInvalid,
            Self::Sandbox(e) if e.is_security_rejection() => ErrorKind::SecurityRejected,
            Self::Sandbox(SandboxError::ActionNotFound(_)) => ErrorKind::NotFound,
            Self::Sandbox(_) => ErrorKind::ExecutionFailed,
            Self::Bundle(BundleError::NotFound(_)) => ErrorKind::NotFound,
            Self::Bundle(BundleError::Io(_)) => ErrorKind::ExecutionFailed,
            Self::Crypto(c) if c.is_decryption_failure() => ErrorKind::DecryptionFailed,
            Self::Crypto(_) => ErrorKind::Storage,
        }
    }

    /// Text safe to return to callers.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotInstalled { .. }
            | Self::Disabled { .. }
            | Self::SecurityRejected(_)
            | Self::Unsigned(_) => self.to_string(),
            Self::Config(ConfigError::NotFound { .. } | ConfigError::ValidationFailed(_)) => {
                self.to_string()
            }
            Self::Config(ConfigError::Conflict { .. }) => {
                "configuration was modified concurrently, retry the request".to_string()
            }
            Self::Security(_) => "plugin signature is invalid".to_string(),
            Self::Sandbox(
                e @ (SandboxError::ForbiddenImport { .. }
                | SandboxError::CapabilityDenied(_)
                | SandboxError::ActionNotFound(_)),
            ) => e.to_string(),
            Self::Sandbox(_) => GENERIC_FAILURE.to_string(),
            Self::Bundle(BundleError::NotFound(_)) => "plugin bundle not found".to_string(),
            Self::Bundle(BundleError::Io(_)) => "plugin bundle is unavailable".to_string(),
            _ => match self.kind() {
                ErrorKind::DecryptionFailed => "configuration could not be decrypted".to_string(),
                _ => "internal storage error".to_string(),
            },
        }
    }
}
