use crate::entry::{AuditEntry, AuditQuery};
use crate::error::{AuditError, AuditResult};
use crate::sink::AuditSink;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use warden_types::{PluginId, TenantId};

/// In-process audit sink, in append order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> AuditResult<MutexGuard<'_, Vec<AuditEntry>>> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Storage("audit buffer lock poisoned".to_string()))
    }

    /// Snapshot of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries()?.push(entry.clone());
        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .entries()?
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count(&self, tenant_id: &TenantId, plugin_id: Option<&PluginId>) -> AuditResult<usize> {
        Ok(self
            .entries()?
            .iter()
            .filter(|e| &e.tenant_id == tenant_id && plugin_id.is_none_or(|p| *p == e.plugin_id))
            .count())
    }
}
