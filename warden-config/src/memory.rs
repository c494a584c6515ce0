use crate::error::{ConfigError, ConfigResult};
use crate::record::{ConfigMap, ConfigRecord};
use crate::repository::ConfigRepository;
use crate::schema::ValidationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use warden_types::{PluginId, TenantId};

type Key = (TenantId, PluginId);

/// In-process configuration repository.
#[derive(Debug, Default)]
pub struct MemoryConfigRepository {
    records: Mutex<HashMap<Key, ConfigRecord>>,
}

impl MemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> ConfigResult<MutexGuard<'_, HashMap<Key, ConfigRecord>>> {
        self.records
            .lock()
            .map_err(|_| ConfigError::Storage("config map lock poisoned".to_string()))
    }

    fn key(tenant_id: &TenantId, plugin_id: &PluginId) -> Key {
        (tenant_id.clone(), plugin_id.clone())
    }
}

#[async_trait]
impl ConfigRepository for MemoryConfigRepository {
    async fn get(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigRecord>> {
        Ok(self.records()?.get(&Self::key(tenant_id, plugin_id)).cloned())
    }

    async fn public_fields(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigMap>> {
        Ok(self
            .records()?
            .get(&Self::key(tenant_id, plugin_id))
            .map(|r| r.public_fields.clone()))
    }

    async fn upsert(
        &self,
        mut record: ConfigRecord,
        expected_revision: Option<u64>,
    ) -> ConfigResult<ConfigRecord> {
        let key = Self::key(&record.tenant_id, &record.plugin_id);
        let mut records = self.records()?;

        let current = records.get(&key).map(|r| r.revision);
        if current != expected_revision {
            return Err(ConfigError::Conflict {
                tenant_id: key.0,
                plugin_id: key.1,
            });
        }

        // The validation stamp is owned by `record_validation`.
        if let Some(stored) = records.get(&key) {
            record.last_validated_at = stored.last_validated_at;
            record.validation_errors = stored.validation_errors.clone();
        }
        record.revision = current.unwrap_or(0) + 1;
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn record_validation(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        validated_at: DateTime<Utc>,
        errors: Vec<ValidationError>,
    ) -> ConfigResult<bool> {
        let mut records = self.records()?;
        match records.get_mut(&Self::key(tenant_id, plugin_id)) {
            Some(record) => {
                record.last_validated_at = Some(validated_at);
                record.validation_errors = errors;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tenant_id: &TenantId, plugin_id: &PluginId) -> ConfigResult<bool> {
        Ok(self
            .records()?
            .remove(&Self::key(tenant_id, plugin_id))
            .is_some())
    }
}
