//! The capability context handed to one action invocation.
//!
//! The context is the only thing a plugin sees of the host: the decrypted
//! configuration, the caller's parameters and metadata, and the set of
//! capabilities it may import. It is built per call and consumed by the
//! sandbox, so nothing in it outlives the invocation.

use crate::capabilities::{Capability, CapabilitySet};
use crate::error::SandboxResult;
use serde_json::{Map, Value, json};
use std::fmt;
use warden_types::{PluginId, TenantId};

pub struct CapabilityContext {
    tenant_id: TenantId,
    plugin_id: PluginId,
    action: String,
    config: Map<String, Value>,
    parameters: Value,
    metadata: Option<Value>,
    capabilities: CapabilitySet,
}

impl CapabilityContext {
    pub fn builder(
        tenant_id: TenantId,
        plugin_id: PluginId,
        action: impl Into<String>,
    ) -> CapabilityContextBuilder {
        CapabilityContextBuilder {
            tenant_id,
            plugin_id,
            action: action.into(),
            config: Map::new(),
            parameters: Value::Null,
            metadata: None,
            capabilities: CapabilitySet::default(),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Resolves a guest import against the granted capabilities.
    pub fn require(&self, module: &str, name: &str) -> SandboxResult<Capability> {
        self.capabilities.require(module, name)
    }

    /// The JSON document passed to the action handler.
    pub fn input_document(&self) -> SandboxResult<Vec<u8>> {
        let doc = json!({
            "action": self.action,
            "parameters": self.parameters,
            "config": self.config,
            "metadata": self.metadata,
        });
        Ok(serde_json::to_vec(&doc)?)
    }
}

// Config holds decrypted secrets; only its keys are printed.
impl fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("tenant_id", &self.tenant_id)
            .field("plugin_id", &self.plugin_id)
            .field("action", &self.action)
            .field("config_keys", &self.config.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

pub struct CapabilityContextBuilder {
    tenant_id: TenantId,
    plugin_id: PluginId,
    action: String,
    config: Map<String, Value>,
    parameters: Value,
    metadata: Option<Value>,
    capabilities: CapabilitySet,
}

impl CapabilityContextBuilder {
    pub fn config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn build(self) -> CapabilityContext {
        CapabilityContext {
            tenant_id: self.tenant_id,
            plugin_id: self.plugin_id,
            action: self.action,
            config: self.config,
            parameters: self.parameters,
            metadata: self.metadata,
            capabilities: self.capabilities,
        }
    }
}
