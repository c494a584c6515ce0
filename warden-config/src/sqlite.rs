//! SQLite-backed configuration repository.
//!
//! Each bucket lives in its own column so the public view can be answered
//! without reading ciphertext. Revision checks happen inside the `UPDATE`
//! / `INSERT` statements themselves, so two writers can never both win.

use crate::error::{ConfigError, ConfigResult};
use crate::record::{ConfigMap, ConfigRecord};
use crate::repository::ConfigRepository;
use crate::schema::ValidationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;
use warden_crypto::SecretValue;
use warden_types::{PluginId, TenantId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS config_records (
        tenant_id TEXT NOT NULL,
        plugin_id TEXT NOT NULL,
        version TEXT NOT NULL,
        public_fields TEXT NOT NULL,
        encrypted_fields TEXT NOT NULL,
        schema_json TEXT,
        last_validated_at TEXT,
        validation_errors TEXT NOT NULL DEFAULT '[]',
        revision INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (tenant_id, plugin_id)
    );
";

/// Persistent configuration repository backed by SQLite.
pub struct SqliteConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConfigRepository {
    pub fn open(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ConfigError::Storage(format!("failed to open config store: {e}")))?;
        Self::init(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> ConfigResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ConfigError::Storage(format!("failed to open config store: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ConfigResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| ConfigError::Storage(format!("failed to init config schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> ConfigResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ConfigResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ConfigError::Storage("config store lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| ConfigError::Storage(format!("config task failed: {e}")))?
    }
}

fn parse_time(s: &str) -> ConfigResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConfigError::Storage(format!("invalid timestamp in config store: {e}")))
}

struct RawRecord {
    tenant_id: String,
    plugin_id: String,
    version: String,
    public_fields: String,
    encrypted_fields: String,
    schema: Option<String>,
    last_validated_at: Option<String>,
    validation_errors: String,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tenant_id: row.get(0)?,
            plugin_id: row.get(1)?,
            version: row.get(2)?,
            public_fields: row.get(3)?,
            encrypted_fields: row.get(4)?,
            schema: row.get(5)?,
            last_validated_at: row.get(6)?,
            validation_errors: row.get(7)?,
            revision: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> ConfigResult<ConfigRecord> {
        let invalid_id = |e: warden_types::Error| ConfigError::Storage(format!("invalid id in config store: {e}"));
        Ok(ConfigRecord {
            tenant_id: TenantId::parse(&self.tenant_id).map_err(invalid_id)?,
            plugin_id: PluginId::parse(&self.plugin_id).map_err(invalid_id)?,
            version: self.version,
            public_fields: serde_json::from_str(&self.public_fields)?,
            encrypted_fields: decode_secrets(&self.tenant_id, &self.plugin_id, &self.encrypted_fields)?,
            schema: self.schema.map(|s| serde_json::from_str(&s)).transpose()?,
            last_validated_at: self.last_validated_at.as_deref().map(parse_time).transpose()?,
            validation_errors: serde_json::from_str(&self.validation_errors)?,
            revision: self.revision as u64,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

/// Decodes each stored secret on its own. An entry that no longer parses
/// is left out, the same way a secret that fails to decrypt is.
fn decode_secrets(
    tenant_id: &str,
    plugin_id: &str,
    column: &str,
) -> ConfigResult<BTreeMap<String, SecretValue>> {
    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(column)?;
    let mut secrets = BTreeMap::new();
    for (field, value) in entries {
        match serde_json::from_value::<SecretValue>(value) {
            Ok(secret) => {
                secrets.insert(field, secret);
            }
            Err(e) => warn!(
                tenant_id,
                plugin_id,
                field = %field,
                reason = %e,
                "stored secret field unreadable, omitting"
            ),
        }
    }
    Ok(secrets)
}

#[async_trait]
impl ConfigRepository for SqliteConfigRepository {
    async fn get(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigRecord>> {
        let (tenant, plugin) = (tenant_id.to_string(), plugin_id.to_string());
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT tenant_id, plugin_id, version, public_fields, encrypted_fields, \
                     schema_json, last_validated_at, validation_errors, revision, created_at, \
                     updated_at FROM config_records WHERE tenant_id = ?1 AND plugin_id = ?2",
                    params![tenant, plugin],
                    RawRecord::from_row,
                )
                .optional()?;
            raw.map(RawRecord::decode).transpose()
        })
        .await
    }

    async fn public_fields(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> ConfigResult<Option<ConfigMap>> {
        let (tenant, plugin) = (tenant_id.to_string(), plugin_id.to_string());
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT public_fields FROM config_records WHERE tenant_id = ?1 AND plugin_id = ?2",
                    params![tenant, plugin],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
        })
        .await
    }

    async fn upsert(
        &self,
        mut record: ConfigRecord,
        expected_revision: Option<u64>,
    ) -> ConfigResult<ConfigRecord> {
        let public = serde_json::to_string(&record.public_fields)?;
        let encrypted = serde_json::to_string(&record.encrypted_fields)?;
        let schema = record.schema.as_ref().map(serde_json::to_string).transpose()?;
        let errors = serde_json::to_string(&record.validation_errors)?;
        record.revision = expected_revision.unwrap_or(0) + 1;

        self.with_conn(move |conn| {
            let validated = record.last_validated_at.map(|t| t.to_rfc3339());
            let changed = match expected_revision {
                None => conn.execute(
                    "INSERT INTO config_records (tenant_id, plugin_id, version, public_fields, \
                     encrypted_fields, schema_json, last_validated_at, validation_errors, revision, \
                     created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                     ON CONFLICT (tenant_id, plugin_id) DO NOTHING",
                    params![
                        record.tenant_id.as_str(),
                        record.plugin_id.as_str(),
                        record.version,
                        public,
                        encrypted,
                        schema,
                        validated,
                        errors,
                        record.revision as i64,
                        record.created_at.to_rfc3339(),
                        record.updated_at.to_rfc3339(),
                    ],
                )?,
                Some(expected) => {
                    // The validation stamp is owned by `record_validation`.
                    let changed = conn.execute(
                        "UPDATE config_records SET version = ?3, public_fields = ?4, \
                         encrypted_fields = ?5, schema_json = ?6, revision = ?7, updated_at = ?8 \
                         WHERE tenant_id = ?1 AND plugin_id = ?2 AND revision = ?9",
                        params![
                            record.tenant_id.as_str(),
                            record.plugin_id.as_str(),
                            record.version,
                            public,
                            encrypted,
                            schema,
                            record.revision as i64,
                            record.updated_at.to_rfc3339(),
                            expected as i64,
                        ],
                    )?;
                    if changed == 1 {
                        let (validated, errors): (Option<String>, String) = conn.query_row(
                            "SELECT last_validated_at, validation_errors FROM config_records \
                             WHERE tenant_id = ?1 AND plugin_id = ?2",
                            params![record.tenant_id.as_str(), record.plugin_id.as_str()],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )?;
                        record.last_validated_at = validated.as_deref().map(parse_time).transpose()?;
                        record.validation_errors = serde_json::from_str(&errors)?;
                    }
                    changed
                }
            };

            if changed == 1 {
                Ok(record)
            } else {
                Err(ConfigError::Conflict {
                    tenant_id: record.tenant_id,
                    plugin_id: record.plugin_id,
                })
            }
        })
        .await
    }

    async fn record_validation(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        validated_at: DateTime<Utc>,
        errors: Vec<ValidationError>,
    ) -> ConfigResult<bool> {
        let (tenant, plugin) = (tenant_id.to_string(), plugin_id.to_string());
        let errors = serde_json::to_string(&errors)?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE config_records SET last_validated_at = ?3, validation_errors = ?4 \
                 WHERE tenant_id = ?1 AND plugin_id = ?2",
                params![tenant, plugin, validated_at.to_rfc3339(), errors],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn delete(&self, tenant_id: &TenantId, plugin_id: &PluginId) -> ConfigResult<bool> {
        let (tenant, plugin) = (tenant_id.to_string(), plugin_id.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM config_records WHERE tenant_id = ?1 AND plugin_id = ?2",
                params![tenant, plugin],
            )?;
            Ok(changed == 1)
        })
        .await
    }
}
