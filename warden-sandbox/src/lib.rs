//! Per-call WebAssembly sandbox for plugin action handlers.
//!
//! A plugin bundle is a core wasm module. Each execution compiles it into a
//! fresh wasmtime engine and store, links only the capabilities granted in
//! its [`CapabilityContext`], and runs one named action under fuel, memory
//! and wall-clock bounds.

pub mod capabilities;
pub mod config;
pub mod context;
pub mod error;
pub mod exports;
mod host;
mod limiter;
mod runtime;
pub mod sandbox;

pub use capabilities::{Capability, CapabilitySet, CapabilityTier};
pub use config::SandboxConfig;
pub use context::{CapabilityContext, CapabilityContextBuilder};
pub use error::{SandboxError, SandboxResult};
pub use exports::{ActionTable, ExportShape, ExportedFunc, detect_action_table};
pub use sandbox::{
    ActionSandbox, ExecutionOutcome, ExecutionStatus, GENERIC_FAILURE, MAX_ERROR_CHARS,
};
