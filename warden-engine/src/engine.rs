//! The engine facade: configuration, code vetting and action execution
//! behind one type.

use crate::bundle::BundleStore;
use crate::config::{EngineConfig, OperatorSecrets};
use crate::error::{EngineError, EngineResult};
use crate::registry::InstallationRegistry;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use warden_audit::{AuditEntry, AuditLog, AuditQuery, AuditSink, MemoryAuditSink, SqliteAuditSink};
use warden_config::{
    ConfigMap, ConfigRecord, ConfigRepository, ConfigSchema, ConfigStore, MemoryConfigRepository,
    SqliteConfigRepository, ValidationReport,
};
use warden_crypto::CryptoVault;
use warden_sandbox::{ActionSandbox, CapabilityContext, ExecutionStatus};
use warden_security::{PluginSignature, PluginSigner, SecurityReport, SecurityValidator};
use warden_types::{ActorContext, ExecutionRequest, ExecutionResult, PluginId, TenantId};

/// Stages an execution request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Resolving,
    ConfigLoaded,
    ContextBuilt,
    Executing,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolving => "resolving",
            Self::ConfigLoaded => "config_loaded",
            Self::ContextBuilt => "context_built",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        })
    }
}

fn enter(phase: ExecutionPhase) {
    debug!(phase = %phase, "execution phase");
}

pub struct PluginEngine {
    config: EngineConfig,
    configs: ConfigStore,
    validator: Arc<SecurityValidator>,
    signer: PluginSigner,
    sandbox: ActionSandbox,
    registry: Arc<dyn InstallationRegistry>,
    bundles: Arc<dyn BundleStore>,
}

impl PluginEngine {
    /// Wires the engine over explicit storage backends.
    pub fn new(
        config: EngineConfig,
        secrets: &OperatorSecrets,
        repository: Arc<dyn ConfigRepository>,
        audit_sink: Arc<dyn AuditSink>,
        registry: Arc<dyn InstallationRegistry>,
        bundles: Arc<dyn BundleStore>,
    ) -> EngineResult<Self> {
        let vault = CryptoVault::from_secret(secrets.encryption_secret())?;
        info!(key_fingerprint = %vault.fingerprint(), "configuration vault ready");

        let validator = Arc::new(SecurityValidator::new(
            config.security.clone(),
            config.environment,
        ));
        let signer = PluginSigner::new(secrets.signing_secret())?;
        let sandbox = ActionSandbox::new(config.sandbox.clone(), Arc::clone(&validator))?;
        let configs = ConfigStore::new(repository, Arc::new(vault), AuditLog::new(audit_sink));

        Ok(Self {
            config,
            configs,
            validator,
            signer,
            sandbox,
            registry,
            bundles,
        })
    }

    /// Engine with in-memory configuration and audit storage.
    pub fn in_memory(
        config: EngineConfig,
        secrets: &OperatorSecrets,
        registry: Arc<dyn InstallationRegistry>,
        bundles: Arc<dyn BundleStore>,
    ) -> EngineResult<Self> {
        Self::new(
            config,
            secrets,
            Arc::new(MemoryConfigRepository::new()),
            Arc::new(MemoryAuditSink::new()),
            registry,
            bundles,
        )
    }

    /// Engine persisting to `config.db` and `audit.db` under `data_dir`.
    pub fn open(
        config: EngineConfig,
        secrets: &OperatorSecrets,
        data_dir: impl AsRef<Path>,
        registry: Arc<dyn InstallationRegistry>,
        bundles: Arc<dyn BundleStore>,
    ) -> EngineResult<Self> {
        let data_dir = data_dir.as_ref();
        let repository = SqliteConfigRepository::open(data_dir.join("config.db"))?;
        let audit_sink = SqliteAuditSink::open(data_dir.join("audit.db"))?;
        Self::new(
            config,
            secrets,
            Arc::new(repository),
            Arc::new(audit_sink),
            registry,
            bundles,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Configuration ───────────────────────────────────────────

    pub async fn save_config(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        version: &str,
        config: ConfigMap,
        schema: Option<ConfigSchema>,
        actor: &ActorContext,
    ) -> EngineResult<ConfigRecord> {
        Ok(self
            .configs
            .save(tenant_id, plugin_id, version, config, schema, actor)
            .await?)
    }

    pub async fn get_config(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        actor: &ActorContext,
    ) -> EngineResult<ConfigMap> {
        Ok(self.configs.get(tenant_id, plugin_id, actor).await?)
    }

    pub async fn get_public_config(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
    ) -> EngineResult<Option<ConfigMap>> {
        Ok(self.configs.get_public(tenant_id, plugin_id).await?)
    }

    pub async fn delete_config(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        actor: &ActorContext,
    ) -> EngineResult<bool> {
        Ok(self.configs.delete(tenant_id, plugin_id, actor).await?)
    }

    pub async fn validate_config(
        &self,
        tenant_id: &TenantId,
        plugin_id: &PluginId,
        candidate: &ConfigMap,
    ) -> EngineResult<ValidationReport> {
        Ok(self.configs.validate(tenant_id, plugin_id, candidate).await?)
    }

    /// Audit entries for a tenant (optionally one plugin), newest first.
    pub async fn list_audit_logs(&self, query: &AuditQuery) -> EngineResult<Vec<AuditEntry>> {
        Ok(self.configs.audit().list(query).await?)
    }

    // ── Code trust ──────────────────────────────────────────────

    pub fn validate_plugin_code(&self, source: &str, filename: &str) -> SecurityReport {
        let report = self.validator.validate_code(source, filename);
        if !report.safe {
            warn!(filename, risks = report.risks.len(), "plugin code flagged as unsafe");
        }
        report
    }

    /// Vets then signs. Unsafe code is never signed.
    pub fn sign_plugin(
        &self,
        source: &str,
        filename: &str,
        plugin_id: &PluginId,
        version: &str,
    ) -> EngineResult<PluginSignature> {
        let report = self.validate_plugin_code(source, filename);
        if !report.safe {
            return Err(EngineError::SecurityRejected(report.risks));
        }
        Ok(self.signer.sign(source.as_bytes(), plugin_id, version)?)
    }

    pub fn verify_plugin_signature(
        &self,
        source: &[u8],
        plugin_id: &PluginId,
        version: &str,
        signature: &PluginSignature,
    ) -> bool {
        self.signer.verify(source, plugin_id, version, signature)
    }

    /// Signs a compiled bundle as-is, without the source scan.
    pub fn sign_bundle(
        &self,
        bundle: &[u8],
        plugin_id: &PluginId,
        version: &str,
    ) -> EngineResult<PluginSignature> {
        Ok(self.signer.sign(bundle, plugin_id, version)?)
    }

    // ── Execution ───────────────────────────────────────────────

    /// Runs one action for a tenant.
    ///
    /// Failures before the handler runs (not installed, disabled, missing
    /// configuration or bundle, bad signature, rejected imports) are
    /// errors. Once the handler has run the answer is always an
    /// [`ExecutionResult`], with `success == false` on failure or timeout.
    pub async fn execute_action(
        &self,
        request: ExecutionRequest,
        actor: &ActorContext,
    ) -> EngineResult<ExecutionResult> {
        let span = info_span!(
            "execute_action",
            tenant_id = %request.tenant_id,
            plugin_id = %request.plugin_id,
            action = %request.action,
        );
        self.run(request, actor).instrument(span).await
    }

    async fn run(
        &self,
        request: ExecutionRequest,
        actor: &ActorContext,
    ) -> EngineResult<ExecutionResult> {
        let ExecutionRequest {
            tenant_id,
            plugin_id,
            action,
            parameters,
            metadata,
        } = request;

        enter(ExecutionPhase::Resolving);
        let installation = self.registry.installation(&tenant_id, &plugin_id).await;
        let installation = match installation {
            Some(installation) if installation.enabled => installation,
            Some(_) => return Err(EngineError::Disabled { tenant_id, plugin_id }),
            None => return Err(EngineError::NotInstalled { tenant_id, plugin_id }),
        };

        let config = self.configs.get(&tenant_id, &plugin_id, actor).await?;
        enter(ExecutionPhase::ConfigLoaded);

        let bundle = self
            .bundles
            .fetch_bundle_source(&installation.bundle_ref)
            .await?;
        match &installation.signature {
            Some(signature) => {
                self.signer
                    .ensure_valid(&bundle, &plugin_id, &installation.version, signature)?;
                debug!(version = %installation.version, "bundle signature verified");
            }
            None if self.config.sandbox.require_signed_bundles => {
                return Err(EngineError::Unsigned(plugin_id));
            }
            None => debug!("unsigned bundle accepted"),
        }

        let ctx = CapabilityContext::builder(tenant_id, plugin_id, action.clone())
            .config(config)
            .parameters(parameters)
            .metadata(metadata)
            .capabilities(self.config.sandbox.capability_set())
            .build();
        enter(ExecutionPhase::ContextBuilt);

        enter(ExecutionPhase::Executing);
        let outcome = match self.sandbox.execute(&bundle, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "action rejected before execution");
                enter(ExecutionPhase::Failed);
                return Err(e.into());
            }
        };

        enter(match outcome.status {
            ExecutionStatus::Completed(_) => ExecutionPhase::Completed,
            ExecutionStatus::Failed(_) => ExecutionPhase::Failed,
            ExecutionStatus::TimedOut { .. } => ExecutionPhase::TimedOut,
        });
        Ok(outcome.into_result(action))
    }
}

impl fmt::Debug for PluginEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
