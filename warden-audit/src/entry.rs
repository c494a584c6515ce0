//! Audit entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use warden_types::{ActorContext, PluginId, TenantId};

/// Default page size for [`AuditQuery`].
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on a single audit page.
pub const MAX_PAGE_SIZE: usize = 500;

/// What kind of configuration access was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    View,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::View => "VIEW",
        })
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "VIEW" => Ok(Self::View),
            other => Err(format!("unknown audit action {other:?}")),
        }
    }
}

/// One immutable audit record.
///
/// `previous_config` and `new_config` are redacted views: sensitive values
/// are replaced before the entry is built, never stored in the clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub plugin_id: PluginId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_config: Option<Value>,
    #[serde(default)]
    pub changed_fields: Vec<String>,
    #[serde(default)]
    pub sensitive_fields_accessed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Starts a successful entry attributed to `actor`.
    pub fn new(
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        action: AuditAction,
        actor: &ActorContext,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.clone(),
            plugin_id: plugin_id.clone(),
            user_id: actor.user_id.clone(),
            action,
            previous_config: None,
            new_config: None,
            changed_fields: Vec::new(),
            sensitive_fields_accessed: Vec::new(),
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
            timestamp: Utc::now(),
            success: true,
            error_message: None,
        }
    }

    pub fn with_previous_config(mut self, config: Value) -> Self {
        self.previous_config = Some(config);
        self
    }

    pub fn with_new_config(mut self, config: Value) -> Self {
        self.new_config = Some(config);
        self
    }

    pub fn with_changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = fields;
        self
    }

    pub fn with_sensitive_fields(mut self, fields: Vec<String>) -> Self {
        self.sensitive_fields_accessed = fields;
        self
    }

    /// Marks the entry as recording a failed operation.
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}

/// Page request over one tenant's audit trail, optionally narrowed to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub tenant_id: TenantId,
    pub plugin_id: Option<PluginId>,
    pub limit: usize,
    pub offset: usize,
}

impl AuditQuery {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            plugin_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn plugin(mut self, plugin_id: PluginId) -> Self {
        self.plugin_id = Some(plugin_id);
        self
    }

    /// Sets the page window; `limit` is clamped to [`MAX_PAGE_SIZE`].
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit.min(MAX_PAGE_SIZE);
        self.offset = offset;
        self
    }

    /// Whether `entry` falls under this query's tenant/plugin filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        entry.tenant_id == self.tenant_id
            && self
                .plugin_id
                .as_ref()
                .is_none_or(|plugin| *plugin == entry.plugin_id)
    }
}
