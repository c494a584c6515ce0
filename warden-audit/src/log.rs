use crate::entry::{AuditEntry, AuditQuery};
use crate::error::AuditResult;
use crate::sink::AuditSink;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_types::{PluginId, TenantId};

/// Best-effort front for an [`AuditSink`].
///
/// Writes that fail are dropped and reported through `tracing` so the
/// configuration operation that produced them still completes.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Appends an entry. Never fails; sink errors are logged at `warn`.
    pub async fn append(&self, entry: AuditEntry) {
        match self.sink.append(&entry).await {
            Ok(()) => debug!(
                tenant_id = %entry.tenant_id,
                plugin_id = %entry.plugin_id,
                action = %entry.action,
                success = entry.success,
                "audit entry recorded"
            ),
            Err(e) => warn!(
                audit_write_failed = true,
                tenant_id = %entry.tenant_id,
                plugin_id = %entry.plugin_id,
                action = %entry.action,
                error = %e,
                "dropping audit entry"
            ),
        }
    }

    /// Lists entries newest-first.
    pub async fn list(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        self.sink.list(query).await
    }

    pub async fn count(&self, tenant_id: &TenantId, plugin_id: Option<&PluginId>) -> AuditResult<usize> {
        self.sink.count(tenant_id, plugin_id).await
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
