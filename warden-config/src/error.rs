//! Error types for the configuration layer.

use crate::schema::ValidationError;
use thiserror::Error;
use warden_types::{PluginId, TenantId};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration for plugin {plugin_id} in tenant {tenant_id}")]
    NotFound {
        tenant_id: TenantId,
        plugin_id: PluginId,
    },

    /// The candidate configuration violates the plugin's schema.
    #[error("configuration validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<ValidationError>),

    /// Another writer changed the record since it was read.
    #[error("concurrent modification of configuration for plugin {plugin_id} in tenant {tenant_id}")]
    Conflict {
        tenant_id: TenantId,
        plugin_id: PluginId,
    },

    /// A secret could not be encrypted. Decryption failures never surface
    /// here; they are recovered per field.
    #[error("encryption error: {0}")]
    Crypto(#[from] warden_crypto::CryptoError),

    #[error("configuration storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<rusqlite::Error> for ConfigError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
