//! The configuration store: encryption split, diffing and audit.

use crate::error::{ConfigError, ConfigResult};
use crate::record::{ConfigMap, ConfigRecord};
use crate::repository::ConfigRepository;
use crate::schema::{ConfigSchema, ValidationReport};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_audit::{AuditAction, AuditEntry, AuditLog};
use warden_crypto::SecretCipher;
use warden_types::{ActorContext, PluginId, TenantId};

/// Placeholder written to audit snapshots in place of sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Read-modify-write attempts before a save gives up on a contended record.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Versioned, tenant-scoped plugin configuration.
///
/// Cheap to clone; clones share the repository, cipher and audit log.
#[derive(Clone)]
pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    cipher: Arc<dyn SecretCipher>,
    audit: AuditLog,
}

struct Saved {
    record: ConfigRecord,
    entry: AuditEntry,
}

impl ConfigStore {
    pub fn new(
        repo: Arc<dyn ConfigRepository>,
        cipher: Arc<dyn SecretCipher>,
        audit: AuditLog,
    ) -> Self {
        Self {
            repo,
            cipher,
            audit,
        }
    }

    /// The audit log every operation writes to.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Creates or replaces the configuration for `(tenant_id, plugin_id)`.
    ///
    /// Fields named in the effective schema's `sensitive_fields` are
    /// encrypted one by one; everything else is stored as public JSON. When
    /// `schema` is `None` the schema already on the record (if any) applies.
    pub async fn save(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        version: &str,
        config: ConfigMap,
        schema: Option<ConfigSchema>,
        actor: &ActorContext,
    ) -> ConfigResult<ConfigRecord> {
        let mut action = AuditAction::Create;
        let outcome = self
            .try_save(tenant_id, plugin_id, version, config, schema, actor, &mut action)
            .await;

        match outcome {
            Ok(Saved { record, entry }) => {
                info!(
                    tenant_id = %tenant_id,
                    plugin_id = %plugin_id,
                    revision = record.revision,
                    action = %entry.action,
                    "configuration saved"
                );
                self.audit.append(entry).await;
                Ok(record)
            }
            Err(e) => {
                warn!(tenant_id = %tenant_id, plugin_id = %plugin_id, error = %e, "configuration save failed");
                self.audit
                    .append(AuditEntry::new(tenant_id, plugin_id, action, actor).failed(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_save(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        version: &str,
        config: ConfigMap,
        schema: Option<ConfigSchema>,
        actor: &ActorContext,
        action: &mut AuditAction,
    ) -> ConfigResult<Saved> {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let existing = self.repo.get(tenant_id, plugin_id).await?;
            *action = if existing.is_some() {
                AuditAction::Update
            } else {
                AuditAction::Create
            };

            let schema = schema
                .clone()
                .or_else(|| existing.as_ref().and_then(|r| r.schema.clone()));
            if let Some(schema) = &schema {
                let report = schema.validate(&config);
                if !report.valid {
                    return Err(ConfigError::ValidationFailed(report.errors));
                }
            }

            let mut public_fields = ConfigMap::new();
            let mut encrypted_fields = BTreeMap::new();
            for (field, value) in &config {
                if schema.as_ref().is_some_and(|s| s.is_sensitive(field)) {
                    let plaintext = serde_json::to_string(value)?;
                    encrypted_fields.insert(field.clone(), self.cipher.encrypt(&plaintext)?);
                } else {
                    public_fields.insert(field.clone(), value.clone());
                }
            }

            let now = Utc::now();
            let record = ConfigRecord {
                tenant_id: tenant_id.clone(),
                plugin_id: plugin_id.clone(),
                version: version.to_string(),
                public_fields,
                encrypted_fields,
                schema,
                last_validated_at: existing.as_ref().and_then(|r| r.last_validated_at),
                validation_errors: existing
                    .as_ref()
                    .map(|r| r.validation_errors.clone())
                    .unwrap_or_default(),
                revision: existing.as_ref().map_or(0, |r| r.revision),
                created_at: existing.as_ref().map_or(now, |r| r.created_at),
                updated_at: now,
            };

            let expected = existing.as_ref().map(|r| r.revision);
            match self.repo.upsert(record, expected).await {
                Ok(stored) => {
                    let mut entry = AuditEntry::new(tenant_id, plugin_id, *action, actor)
                        .with_new_config(Value::Object(redact(&config, &stored)))
                        .with_sensitive_fields(stored.encrypted_field_names());
                    let previous = match &existing {
                        Some(prev) => {
                            let (view, _) = self.decrypted_view(prev);
                            entry = entry.with_previous_config(Value::Object(redact(&view, prev)));
                            view
                        }
                        None => ConfigMap::new(),
                    };
                    entry = entry.with_changed_fields(changed_fields(&previous, &config));
                    return Ok(Saved {
                        record: stored,
                        entry,
                    });
                }
                Err(ConfigError::Conflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    debug!(
                        tenant_id = %tenant_id,
                        plugin_id = %plugin_id,
                        attempt,
                        "configuration changed concurrently, retrying save"
                    );
                }
                Err(ConfigError::Conflict { .. }) => {
                    return Err(ConfigError::Storage(format!(
                        "configuration kept changing concurrently; gave up after {MAX_SAVE_ATTEMPTS} attempts"
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Err(ConfigError::Storage("save retry loop exhausted".to_string()))
    }

    /// Returns the full configuration with secrets decrypted.
    ///
    /// Secrets that fail to decrypt are left out of the result and logged;
    /// the rest of the record is still returned.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        actor: &ActorContext,
    ) -> ConfigResult<ConfigMap> {
        let record = match self.repo.get(tenant_id, plugin_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let err = ConfigError::NotFound {
                    tenant_id: tenant_id.clone(),
                    plugin_id: plugin_id.clone(),
                };
                self.audit
                    .append(AuditEntry::new(tenant_id, plugin_id, AuditAction::View, actor).failed(err.to_string()))
                    .await;
                return Err(err);
            }
            Err(e) => {
                self.audit
                    .append(AuditEntry::new(tenant_id, plugin_id, AuditAction::View, actor).failed(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let (view, accessed) = self.decrypted_view(&record);
        self.audit
            .append(
                AuditEntry::new(tenant_id, plugin_id, AuditAction::View, actor)
                    .with_sensitive_fields(accessed),
            )
            .await;
        Ok(view)
    }

    /// Returns only the public fields, or `None` when no record exists.
    ///
    /// Reads the public bucket alone; ciphertext is never loaded.
    pub async fn get_public(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigMap>> {
        self.repo.public_fields(tenant_id, plugin_id).await
    }

    /// Validates `candidate` against the stored schema and stamps the result
    /// onto the record.
    ///
    /// With no record, or a record without a schema, the candidate is valid
    /// and nothing is persisted.
    pub async fn validate(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        candidate: &ConfigMap,
    ) -> ConfigResult<ValidationReport> {
        let Some(schema) = self
            .repo
            .get(tenant_id, plugin_id)
            .await?
            .and_then(|record| record.schema)
        else {
            return Ok(ValidationReport::ok());
        };

        let report = schema.validate(candidate);
        self.repo
            .record_validation(tenant_id, plugin_id, Utc::now(), report.errors.clone())
            .await?;
        debug!(
            tenant_id = %tenant_id,
            plugin_id = %plugin_id,
            valid = report.valid,
            errors = report.errors.len(),
            "configuration validated"
        );
        Ok(report)
    }

    /// Deletes the record. Returns `false` when there was nothing to delete;
    /// the attempt is audited either way.
    pub async fn delete(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        actor: &ActorContext,
    ) -> ConfigResult<bool> {
        let entry = AuditEntry::new(tenant_id, plugin_id, AuditAction::Delete, actor);

        let existing = match self.repo.get(tenant_id, plugin_id).await {
            Ok(existing) => existing,
            Err(e) => {
                self.audit.append(entry.failed(e.to_string())).await;
                return Err(e);
            }
        };
        let Some(existing) = existing else {
            self.audit.append(entry.failed("configuration not found")).await;
            return Ok(false);
        };

        match self.repo.delete(tenant_id, plugin_id).await {
            Ok(true) => {
                let mut previous = existing.public_fields.clone();
                for field in existing.encrypted_fields.keys() {
                    previous.insert(field.clone(), Value::String(REDACTED.to_string()));
                }
                info!(tenant_id = %tenant_id, plugin_id = %plugin_id, "configuration deleted");
                self.audit
                    .append(
                        entry
                            .with_previous_config(Value::Object(previous))
                            .with_changed_fields(sorted_keys(&existing)),
                    )
                    .await;
                Ok(true)
            }
            Ok(false) => {
                self.audit.append(entry.failed("configuration not found")).await;
                Ok(false)
            }
            Err(e) => {
                self.audit.append(entry.failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Public fields merged with every secret that decrypts cleanly, plus
    /// the names of those secrets.
    fn decrypted_view(&self, record: &ConfigRecord) -> (ConfigMap, Vec<String>) {
        let mut view = record.public_fields.clone();
        let mut accessed = Vec::new();

        for (field, secret) in &record.encrypted_fields {
            let decoded = self
                .cipher
                .decrypt(secret)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
            match decoded {
                Ok(value) => {
                    view.insert(field.clone(), value);
                    accessed.push(field.clone());
                }
                Err(reason) => warn!(
                    tenant_id = %record.tenant_id,
                    plugin_id = %record.plugin_id,
                    field = %field,
                    reason = %reason,
                    "secret field unavailable, omitting"
                ),
            }
        }

        (view, accessed)
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

/// Copy of `view` with every field `record` stores encrypted replaced by
/// [`REDACTED`].
fn redact(view: &ConfigMap, record: &ConfigRecord) -> ConfigMap {
    view.iter()
        .map(|(k, v)| {
            let v = if record.is_encrypted(k) {
                Value::String(REDACTED.to_string())
            } else {
                v.clone()
            };
            (k.clone(), v)
        })
        .collect()
}

/// Sorted keys that were added, removed or modified between two views.
fn changed_fields(previous: &ConfigMap, next: &ConfigMap) -> Vec<String> {
    previous
        .keys()
        .chain(next.keys())
        .filter(|k| previous.get(*k) != next.get(*k))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn sorted_keys(record: &ConfigRecord) -> Vec<String> {
    record
        .public_fields
        .keys()
        .chain(record.encrypted_fields.keys())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> ConfigMap {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn changed_fields_covers_added_removed_and_modified() {
        let prev = map(json!({"a": 1, "b": 2, "c": 3}));
        let next = map(json!({"a": 1, "b": 20, "d": 4}));
        assert_eq!(changed_fields(&prev, &next), vec!["b", "c", "d"]);
    }

    #[test]
    fn changed_fields_empty_when_identical() {
        let prev = map(json!({"a": [1, 2], "b": {"x": true}}));
        assert!(changed_fields(&prev, &prev.clone()).is_empty());
    }
}
