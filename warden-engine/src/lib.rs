//! Plugin trust and execution engine for Warden.
//!
//! [`PluginEngine`] wires the configuration store, audit log, code
//! validator, signer and action sandbox together and exposes the
//! operations callers use. The marketplace's installation records and the
//! bundle object store stay outside; the engine reaches them through
//! [`InstallationRegistry`] and [`BundleStore`].

mod bundle;
mod config;
mod engine;
mod error;
mod registry;

pub use bundle::{BundleError, BundleStore, FsBundleStore, MemoryBundleStore};
pub use config::{EngineConfig, OperatorSecrets};
pub use engine::{ExecutionPhase, PluginEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use registry::{Installation, InstallationRegistry, MemoryInstallationRegistry};
