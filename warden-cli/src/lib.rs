//! Commands behind the `warden` operator binary.
//!
//! Each command reads its inputs from disk and returns a serializable
//! value; `main` only parses arguments and prints.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use warden_engine::EngineConfig;
use warden_sandbox::{ActionSandbox, CapabilityContext};
use warden_security::{PluginSignature, PluginSigner, SecurityReport, SecurityValidator};
use warden_types::{ExecutionResult, PluginId, TenantId};

pub fn validator(config: &EngineConfig) -> SecurityValidator {
    SecurityValidator::new(config.security.clone(), config.environment)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn validate_file(validator: &SecurityValidator, path: &Path) -> Result<SecurityReport> {
    let source = read_source(path)?;
    Ok(validator.validate_code(&source, &file_name(path)))
}

/// Signs a source file after vetting it, or a compiled bundle as-is.
pub fn sign_file(
    validator: &SecurityValidator,
    signer: &PluginSigner,
    path: &Path,
    plugin_id: &PluginId,
    version: &str,
    bundle: bool,
) -> Result<PluginSignature> {
    let bytes = if bundle {
        read_bytes(path)?
    } else {
        let source = read_source(path)?;
        let report = validator.validate_code(&source, &file_name(path));
        if !report.safe {
            bail!("refusing to sign unsafe code: {}", report.risks.join("; "));
        }
        source.into_bytes()
    };
    let signature = signer.sign(&bytes, plugin_id, version)?;
    info!(plugin_id = %plugin_id, version, "signed {}", path.display());
    Ok(signature)
}

pub fn verify_file(
    signer: &PluginSigner,
    path: &Path,
    plugin_id: &PluginId,
    version: &str,
    signature_path: &Path,
) -> Result<bool> {
    let bytes = read_bytes(path)?;
    let signature: PluginSignature = serde_json::from_str(&read_source(signature_path)?)
        .with_context(|| format!("{} is not a signature document", signature_path.display()))?;
    Ok(signer.verify(&bytes, plugin_id, version, &signature))
}

/// Inputs for a one-off local execution.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub tenant_id: TenantId,
    pub plugin_id: PluginId,
    pub action: String,
    pub parameters: Value,
    pub config: Map<String, Value>,
}

/// Runs one action of a bundle in the sandbox, bypassing the config store.
pub async fn run_bundle(config: &EngineConfig, bundle: &Path, args: RunArgs) -> Result<ExecutionResult> {
    let bytes = read_bytes(bundle)?;
    let sandbox = ActionSandbox::new(config.sandbox.clone(), Arc::new(validator(config)))?;
    let ctx = CapabilityContext::builder(args.tenant_id, args.plugin_id, args.action.clone())
        .config(args.config)
        .parameters(args.parameters)
        .capabilities(config.sandbox.capability_set())
        .build();
    debug!(?ctx, "running bundle");
    let outcome = sandbox.execute(&bytes, ctx).await?;
    info!(
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        fuel_consumed = outcome.fuel_consumed,
        "run finished"
    );
    Ok(outcome.into_result(args.action))
}

/// Parses an optional JSON object argument.
pub fn parse_object(raw: Option<&str>) -> Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str(raw).context("invalid JSON")? {
            Value::Object(map) => Ok(map),
            _ => bail!("expected a JSON object"),
        },
    }
}
