//! Request/response envelopes for plugin action execution.

use crate::ids::{PluginId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// "Execute action `action` of plugin `plugin_id` for tenant `tenant_id`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub tenant_id: TenantId,
    pub plugin_id: PluginId,
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ExecutionRequest {
    pub fn new(tenant_id: TenantId, plugin_id: PluginId, action: impl Into<String>) -> Self {
        Self {
            tenant_id,
            plugin_id,
            action: action.into(),
            parameters: Value::Object(Default::default()),
            metadata: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Structured outcome of a single action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A completed execution carrying the handler's return value.
    pub fn completed(action: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            action: action.into(),
            data: Some(data),
            error: None,
        }
    }

    /// A failed or timed-out execution. `error` must already be sanitized.
    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}
