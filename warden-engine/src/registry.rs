use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use warden_security::PluginSignature;
use warden_types::{PluginId, TenantId};

/// A tenant's installation of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub enabled: bool,
    /// Installed plugin version; signatures are checked against it.
    pub version: String,
    /// Key of the compiled bundle in the bundle store.
    pub bundle_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<PluginSignature>,
}

impl Installation {
    pub fn new(version: impl Into<String>, bundle_ref: impl Into<String>) -> Self {
        Self {
            enabled: true,
            version: version.into(),
            bundle_ref: bundle_ref.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: PluginSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which plugins each tenant has installed. Owned by the marketplace; the
/// engine only reads it.
#[async_trait]
pub trait InstallationRegistry: Send + Sync {
    async fn installation(&self, tenant_id: &TenantId, plugin_id: &PluginId)
    -> Option<Installation>;

    async fn is_installed_and_enabled(&self, tenant_id: &TenantId, plugin_id: &PluginId) -> bool {
        self.installation(tenant_id, plugin_id)
            .await
            .is_some_and(|installation| installation.enabled)
    }
}

/// In-memory registry for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryInstallationRegistry {
    installations: RwLock<HashMap<(TenantId, PluginId), Installation>>,
}

impl MemoryInstallationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, tenant_id: TenantId, plugin_id: PluginId, installation: Installation) {
        self.installations
            .write()
            .await
            .insert((tenant_id, plugin_id), installation);
    }

    /// Returns `false` when the plugin is not installed.
    pub async fn set_enabled(&self, tenant_id: &TenantId, plugin_id: &PluginId, enabled: bool) -> bool {
        let mut installations = self.installations.write().await;
        match installations.get_mut(&(tenant_id.clone(), plugin_id.clone())) {
            Some(installation) => {
                installation.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn uninstall(&self, tenant_id: &TenantId, plugin_id: &PluginId) -> bool {
        self.installations
            .write()
            .await
            .remove(&(tenant_id.clone(), plugin_id.clone()))
            .is_some()
    }
}

#[async_trait]
impl InstallationRegistry for MemoryInstallationRegistry {
    async fn installation(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> Option<Installation> {
        self.installations
            .read()
            .await
            .get(&(tenant_id.clone(), plugin_id.clone()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enabled_flag_drives_availability() {
        let registry = MemoryInstallationRegistry::new();
        let tenant = TenantId::parse("acme").unwrap();
        let plugin = PluginId::parse("stripe-pay").unwrap();

        assert!(!registry.is_installed_and_enabled(&tenant, &plugin).await);

        registry
            .install(tenant.clone(), plugin.clone(), Installation::new("1.0.0", "stripe-pay/1.0.0.wasm"))
            .await;
        assert!(registry.is_installed_and_enabled(&tenant, &plugin).await);

        assert!(registry.set_enabled(&tenant, &plugin, false).await);
        assert!(!registry.is_installed_and_enabled(&tenant, &plugin).await);

        assert!(registry.uninstall(&tenant, &plugin).await);
        assert!(registry.installation(&tenant, &plugin).await.is_none());
    }
}
