use crate::schema::{ConfigSchema, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use warden_crypto::SecretValue;
use warden_types::{PluginId, TenantId};

/// A flat configuration document: field name to JSON value.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Stored configuration for one plugin in one tenant.
///
/// A field name never appears in both `public_fields` and
/// `encrypted_fields`. `revision` starts at 1 and increases by one on every
/// successful write; repositories compare it to detect concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    pub tenant_id: TenantId,
    pub plugin_id: PluginId,
    pub version: String,
    #[serde(default)]
    pub public_fields: ConfigMap,
    #[serde(default)]
    pub encrypted_fields: BTreeMap<String, SecretValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ConfigSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigRecord {
    /// Whether `field` is stored encrypted.
    pub fn is_encrypted(&self, field: &str) -> bool {
        self.encrypted_fields.contains_key(field)
    }

    /// Names of the encrypted fields, sorted.
    pub fn encrypted_field_names(&self) -> Vec<String> {
        self.encrypted_fields.keys().cloned().collect()
    }
}
