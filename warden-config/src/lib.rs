//! Tenant-scoped plugin configuration for Warden.
//!
//! A [`ConfigRecord`] is keyed by `(tenant, plugin)` and split into two
//! disjoint buckets: public fields stored as plain JSON, and sensitive fields
//! (named by the plugin's [`ConfigSchema`]) each encrypted independently
//! through a [`warden_crypto::SecretCipher`].
//!
//! [`ConfigStore`] is the only entry point callers use. Every `save`, `get`
//! and `delete` appends exactly one audit entry, success or failure.

mod error;
mod memory;
mod record;
mod repository;
mod schema;
mod sqlite;
mod store;

pub use error::{ConfigError, ConfigResult};
pub use memory::MemoryConfigRepository;
pub use record::{ConfigMap, ConfigRecord};
pub use repository::ConfigRepository;
pub use schema::{ConfigSchema, FieldSchema, FieldType, ValidationError, ValidationReport};
pub use sqlite::SqliteConfigRepository;
pub use store::{ConfigStore, REDACTED};
