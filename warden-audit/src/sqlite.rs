//! SQLite-backed audit sink.
//!
//! Uses its own database file so the audit trail is isolated from
//! configuration records. Blocking SQLite calls run on the blocking pool.

use crate::entry::{AuditAction, AuditEntry, AuditQuery};
use crate::error::{AuditError, AuditResult};
use crate::sink::AuditSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use warden_types::{PluginId, TenantId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        tenant_id TEXT NOT NULL,
        plugin_id TEXT NOT NULL,
        user_id TEXT,
        action TEXT NOT NULL,
        previous_config TEXT,
        new_config TEXT,
        changed_fields TEXT NOT NULL,
        sensitive_fields TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        timestamp TEXT NOT NULL,
        success INTEGER NOT NULL,
        error_message TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_audit_tenant_plugin
        ON audit_log (tenant_id, plugin_id, seq);
";

const SELECT_COLUMNS: &str = "id, tenant_id, plugin_id, user_id, action, previous_config, \
    new_config, changed_fields, sensitive_fields, ip_address, user_agent, timestamp, success, \
    error_message";

/// Persistent audit sink backed by SQLite.
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    /// Opens (or creates) an audit database at the given path.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AuditError::Storage(format!("failed to open audit store: {e}")))?;
        Self::init(conn)
    }

    /// Opens an in-memory audit database (for testing).
    pub fn open_in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AuditError::Storage(format!("failed to open in-memory audit store: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AuditResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AuditError::Storage(format!("failed to init audit schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> AuditResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AuditResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AuditError::Storage("audit store lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| AuditError::Storage(format!("audit task failed: {e}")))?
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> AuditResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn opt_json(value: &Option<serde_json::Value>) -> AuditResult<Option<String>> {
    value.as_ref().map(to_json).transpose()
}

/// Raw column values, decoded outside the rusqlite row closure so decode
/// failures surface as [`AuditError::Corrupt`].
struct RawRow {
    id: String,
    tenant_id: String,
    plugin_id: String,
    user_id: Option<String>,
    action: String,
    previous_config: Option<String>,
    new_config: Option<String>,
    changed_fields: String,
    sensitive_fields: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: String,
    success: bool,
    error_message: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            plugin_id: row.get(2)?,
            user_id: row.get(3)?,
            action: row.get(4)?,
            previous_config: row.get(5)?,
            new_config: row.get(6)?,
            changed_fields: row.get(7)?,
            sensitive_fields: row.get(8)?,
            ip_address: row.get(9)?,
            user_agent: row.get(10)?,
            timestamp: row.get(11)?,
            success: row.get(12)?,
            error_message: row.get(13)?,
        })
    }

    fn decode(self) -> AuditResult<AuditEntry> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            AuditError::Corrupt(format!("invalid {what}: {e}"))
        };
        let parse_json = |s: Option<String>| -> AuditResult<Option<serde_json::Value>> {
            s.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        };

        Ok(AuditEntry {
            id: Uuid::parse_str(&self.id).map_err(|e| corrupt("id", &e))?,
            tenant_id: TenantId::parse(&self.tenant_id).map_err(|e| corrupt("tenant_id", &e))?,
            plugin_id: PluginId::parse(&self.plugin_id).map_err(|e| corrupt("plugin_id", &e))?,
            user_id: self.user_id,
            action: self
                .action
                .parse::<AuditAction>()
                .map_err(|e| corrupt("action", &e))?,
            previous_config: parse_json(self.previous_config)?,
            new_config: parse_json(self.new_config)?,
            changed_fields: serde_json::from_str(&self.changed_fields)?,
            sensitive_fields_accessed: serde_json::from_str(&self.sensitive_fields)?,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
                .map_err(|e| corrupt("timestamp", &e))?
                .with_timezone(&Utc),
            success: self.success,
            error_message: self.error_message,
        })
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let previous = opt_json(&entry.previous_config)?;
        let new = opt_json(&entry.new_config)?;
        let changed = to_json(&entry.changed_fields)?;
        let sensitive = to_json(&entry.sensitive_fields_accessed)?;
        let entry = entry.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (id, tenant_id, plugin_id, user_id, action, previous_config, \
                 new_config, changed_fields, sensitive_fields, ip_address, user_agent, timestamp, \
                 success, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    entry.id.to_string(),
                    entry.tenant_id.as_str(),
                    entry.plugin_id.as_str(),
                    entry.user_id,
                    entry.action.to_string(),
                    previous,
                    new,
                    changed,
                    sensitive,
                    entry.ip_address,
                    entry.user_agent,
                    entry.timestamp.to_rfc3339(),
                    entry.success,
                    entry.error_message,
                ],
            )
            .map_err(|e| AuditError::Storage(format!("failed to save audit entry: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn list(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM audit_log \
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR plugin_id = ?2) \
                 ORDER BY seq DESC LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| AuditError::Storage(format!("failed to prepare audit query: {e}")))?;
            let rows = stmt
                .query_map(
                    params![
                        query.tenant_id.as_str(),
                        query.plugin_id.as_ref().map(|p| p.as_str()),
                        query.limit as i64,
                        query.offset as i64,
                    ],
                    RawRow::from_row,
                )
                .map_err(|e| AuditError::Storage(format!("failed to query audit log: {e}")))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?.decode()?);
            }
            Ok(entries)
        })
        .await
    }

    async fn count(&self, tenant_id: &TenantId, plugin_id: Option<&PluginId>) -> AuditResult<usize> {
        let tenant = tenant_id.as_str().to_string();
        let plugin = plugin_id.map(|p| p.as_str().to_string());
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM audit_log WHERE tenant_id = ?1 AND (?2 IS NULL OR plugin_id = ?2)",
                params![tenant, plugin],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
