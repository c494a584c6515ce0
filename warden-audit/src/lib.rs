//! Append-only audit trail for plugin configuration access.
//!
//! Every ConfigStore operation (including failed ones) produces exactly one
//! [`AuditEntry`]. Entries are immutable once written. Writing is
//! best-effort: [`AuditLog::append`] never fails the caller, it logs a
//! warning operators can alert on instead.

mod entry;
mod error;
mod log;
mod memory;
mod sink;
mod sqlite;

pub use entry::{AuditAction, AuditEntry, AuditQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use error::{AuditError, AuditResult};
pub use log::AuditLog;
pub use memory::MemoryAuditSink;
pub use sink::AuditSink;
pub use sqlite::SqliteAuditSink;
