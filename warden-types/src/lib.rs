//! Core type definitions for Warden.
//!
//! This crate defines the small, dependency-light types shared by every
//! subsystem of the plugin trust engine:
//! - Tenant and plugin identifiers (validated slugs)
//! - Actor context threaded through for audit attribution
//! - Execution request/result envelopes exchanged with callers

mod actor;
mod execution;
mod ids;

pub use actor::ActorContext;
pub use execution::{ExecutionRequest, ExecutionResult};
pub use ids::{PluginId, TenantId, MAX_ID_LEN};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: &'static str },
}
