//! Capability model for action handlers.
//!
//! A capability is a host import module the guest may link against. Two
//! tiers:
//! - Always granted: logger (sink-only) and hash (pure)
//! - Operator granted: http (outbound requests through the URL trust gate)
//!
//! No capability exposes filesystem, process or environment access.

use crate::error::{SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One host capability a plugin may import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Logger,
    Hash,
    Http,
}

/// Capability tier classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityTier {
    AlwaysGranted,
    OperatorGranted,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Logger, Capability::Hash, Capability::Http];

    pub fn tier(&self) -> CapabilityTier {
        match self {
            Self::Logger | Self::Hash => CapabilityTier::AlwaysGranted,
            Self::Http => CapabilityTier::OperatorGranted,
        }
    }

    /// Wasm import module this capability is linked under.
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::Logger => "warden:logger",
            Self::Hash => "warden:hash",
            Self::Http => "warden:http",
        }
    }

    /// Function names the capability provides.
    pub fn functions(&self) -> &'static [&'static str] {
        match self {
            Self::Logger => &["log"],
            Self::Hash => &["sha256"],
            Self::Http => &["fetch"],
        }
    }

    pub fn from_module_name(module: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.module_name() == module)
    }
}

/// Capabilities granted to one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    granted: BTreeSet<Capability>,
}

impl Default for CapabilitySet {
    /// The always-granted tier.
    fn default() -> Self {
        Self::from_iter(
            Capability::ALL
                .into_iter()
                .filter(|c| c.tier() == CapabilityTier::AlwaysGranted),
        )
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}

impl CapabilitySet {
    pub fn none() -> Self {
        Self {
            granted: BTreeSet::new(),
        }
    }

    pub fn all() -> Self {
        Self::from_iter(Capability::ALL)
    }

    pub fn grant(&mut self, capability: Capability) {
        self.granted.insert(capability);
    }

    pub fn revoke(&mut self, capability: Capability) {
        self.granted.remove(&capability);
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.granted.iter().copied()
    }

    /// Resolves an import against the allow-list.
    ///
    /// Unknown modules or function names are [`SandboxError::ForbiddenImport`];
    /// known but ungranted capabilities are [`SandboxError::CapabilityDenied`].
    pub fn require(&self, module: &str, name: &str) -> SandboxResult<Capability> {
        let forbidden = || SandboxError::ForbiddenImport {
            module: module.to_string(),
            name: name.to_string(),
        };
        let capability = Capability::from_module_name(module).ok_or_else(forbidden)?;
        if !capability.functions().contains(&name) {
            return Err(forbidden());
        }
        if !self.is_granted(capability) {
            return Err(SandboxError::CapabilityDenied(
                capability.module_name().to_string(),
            ));
        }
        Ok(capability)
    }
}
