//! Error types for the action sandbox.
//!
//! These cover everything that can stop an action *before* its handler
//! runs. Once a handler is running, failures are reported through
//! [`crate::ExecutionStatus`] instead.

use thiserror::Error;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("wasm compilation error: {0}")]
    Compilation(String),

    /// The module imports from a module that is not a known capability.
    #[error("import '{module}::{name}' is not an allowed capability")]
    ForbiddenImport { module: String, name: String },

    /// The module imports a known capability that was not granted.
    #[error("capability '{0}' is not granted to this plugin")]
    CapabilityDenied(String),

    #[error("plugin module is invalid: {0}")]
    InvalidModule(String),

    #[error("plugin exports no action handlers")]
    NoActionTable,

    #[error("action '{0}' is not exported by the plugin")]
    ActionNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sandbox initialization failed: {0}")]
    Initialization(String),

    #[error("sandbox task failed: {0}")]
    Task(String),
}

impl SandboxError {
    /// Whether this is a capability violation found while vetting imports.
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, Self::ForbiddenImport { .. } | Self::CapabilityDenied(_))
    }
}
