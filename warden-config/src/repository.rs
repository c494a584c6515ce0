use crate::error::ConfigResult;
use crate::record::{ConfigMap, ConfigRecord};
use crate::schema::ValidationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_types::{PluginId, TenantId};

/// Persistence for [`ConfigRecord`]s, one per `(tenant, plugin)`.
///
/// Writes are compare-on-revision: `upsert` succeeds only if the stored
/// revision still equals `expected_revision` (`None` meaning "no record
/// yet"), otherwise it fails with [`crate::ConfigError::Conflict`].
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get(&self, tenant_id: &TenantId, plugin_id: &PluginId)
        -> ConfigResult<Option<ConfigRecord>>;

    /// Loads only the public bucket. Implementations must not read the
    /// encrypted bucket to answer this.
    async fn public_fields(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigMap>>;

    /// Writes `record`, returning it as stored with its new revision.
    async fn upsert(
        &self,
        record: ConfigRecord,
        expected_revision: Option<u64>,
    ) -> ConfigResult<ConfigRecord>;

    /// Stamps the outcome of a validation run onto an existing record.
    /// Returns `false` when there is no record.
    async fn record_validation(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        validated_at: DateTime<Utc>,
        errors: Vec<ValidationError>,
    ) -> ConfigResult<bool>;

    /// Removes the record. Returns `false` when there was none.
    async fn delete(&self, tenant_id: &TenantId, plugin_id: &PluginId) -> ConfigResult<bool>;
}
