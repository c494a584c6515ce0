use crate::capabilities::{Capability, CapabilitySet};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource bounds and capability grants for action execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock deadline per call, enforced by epoch interruption.
    pub timeout_ms: u64,
    /// CPU fuel budget per call.
    pub fuel_per_call: u64,
    /// Linear memory ceiling.
    pub max_memory_bytes: usize,
    /// Largest result envelope the host will read back.
    pub max_output_bytes: usize,
    /// Per-request timeout for the http capability.
    pub http_timeout_ms: u64,
    /// Capabilities granted to every plugin.
    pub capabilities: Vec<Capability>,
    /// Reject bundles that carry no signature.
    pub require_signed_bundles: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            fuel_per_call: 1_000_000_000, // ~1 billion instructions
            max_memory_bytes: 32 * 1024 * 1024,
            max_output_bytes: 1024 * 1024,
            http_timeout_ms: 5_000,
            capabilities: vec![Capability::Logger, Capability::Hash],
            require_signed_bundles: false,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn capability_set(&self) -> CapabilitySet {
        self.capabilities.iter().copied().collect()
    }
}
