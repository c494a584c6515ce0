use crate::entry::{AuditEntry, AuditQuery};
use crate::error::AuditResult;
use async_trait::async_trait;
use warden_types::{PluginId, TenantId};

/// Durable destination for audit entries.
///
/// Implementations must never update or delete an entry once appended.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one entry.
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// Returns matching entries newest-first.
    async fn list(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>>;

    /// Counts entries for a tenant, optionally narrowed to one plugin.
    async fn count(&self, tenant_id: &TenantId, plugin_id: Option<&PluginId>) -> AuditResult<usize>;
}
