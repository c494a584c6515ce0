//! Single-action execution with a hard wall-clock deadline.
//!
//! Every call builds a fresh runtime on the blocking pool. The async side
//! waits up to `timeout_ms`; past that it keeps bumping the engine epoch
//! until the guest traps, so a plugin that never yields is still stopped
//! by the host. Timed-out work is never retried.

use crate::capabilities::Capability;
use crate::config::SandboxConfig;
use crate::context::CapabilityContext;
use crate::error::{SandboxError, SandboxResult};
use crate::host::HttpBridge;
use crate::runtime::{Invocation, PluginRuntime};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_security::SecurityValidator;
use warden_types::ExecutionResult;
use wasmtime::Engine;

/// Message returned for any trap, host failure or malformed output.
pub const GENERIC_FAILURE: &str = "action execution failed";

/// Plugin-supplied error messages are cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 256;

const INTERRUPT_POLL: Duration = Duration::from_millis(50);
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Terminal state of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Completed(Value),
    Failed(String),
    TimedOut { timeout_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub elapsed: Duration,
    pub fuel_consumed: u64,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Completed(_))
    }

    pub fn into_result(self, action: impl Into<String>) -> ExecutionResult {
        match self.status {
            ExecutionStatus::Completed(data) => ExecutionResult::completed(action, data),
            ExecutionStatus::Failed(message) => ExecutionResult::failed(action, message),
            ExecutionStatus::TimedOut { timeout_ms } => {
                ExecutionResult::failed(action, format!("action timed out after {timeout_ms}ms"))
            }
        }
    }
}

struct RunReport {
    invocation: Invocation,
    fuel_consumed: u64,
    peak_memory_bytes: usize,
    memory_limit_hit: bool,
}

pub struct ActionSandbox {
    config: SandboxConfig,
    validator: Arc<SecurityValidator>,
    http: reqwest::Client,
}

impl ActionSandbox {
    pub fn new(config: SandboxConfig, validator: Arc<SecurityValidator>) -> SandboxResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| SandboxError::Initialization(format!("http client: {e}")))?;
        Ok(Self {
            config,
            validator,
            http,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Runs one action of `bundle` against `ctx`.
    ///
    /// Errors are reserved for problems found before the handler starts
    /// (compilation, import vetting, missing exports or action). Once the
    /// handler runs, the result is always an [`ExecutionOutcome`].
    pub async fn execute(
        &self,
        bundle: &[u8],
        ctx: CapabilityContext,
    ) -> SandboxResult<ExecutionOutcome> {
        let started = Instant::now();
        let runtime = PluginRuntime::new()?;
        let engine = runtime.engine().clone();

        let http = ctx
            .capabilities()
            .is_granted(Capability::Http)
            .then(|| HttpBridge {
                client: self.http.clone(),
                runtime: tokio::runtime::Handle::current(),
                validator: Arc::clone(&self.validator),
                request_timeout: self.config.http_timeout(),
                deadline: started + self.config.timeout(),
            });

        let tenant_id = ctx.tenant_id().to_string();
        let plugin_id = ctx.plugin_id().to_string();
        let action = ctx.action().to_string();
        let config = self.config.clone();
        let bundle = bundle.to_vec();
        let deadline = started + self.config.timeout();

        let mut task = tokio::task::spawn_blocking(move || {
            run_blocking(&runtime, &bundle, &ctx, &config, http, deadline)
        });

        let (status, fuel_consumed) =
            match tokio::time::timeout(self.config.timeout(), &mut task).await {
                Ok(joined) => {
                    let report = joined.map_err(|e| SandboxError::Task(e.to_string()))??;
                    if report.memory_limit_hit {
                        warn!(
                            tenant_id = %tenant_id,
                            plugin_id = %plugin_id,
                            action = %action,
                            peak_memory_bytes = report.peak_memory_bytes,
                            "plugin hit its memory ceiling"
                        );
                    }
                    let status = self.settle(report.invocation, &tenant_id, &plugin_id, &action);
                    (status, report.fuel_consumed)
                }
                Err(_) => {
                    interrupt(&engine, &mut task).await;
                    let timeout_ms = self.config.timeout_ms;
                    (ExecutionStatus::TimedOut { timeout_ms }, 0)
                }
            };

        let outcome = ExecutionOutcome {
            status,
            elapsed: started.elapsed(),
            fuel_consumed,
        };
        info!(
            tenant_id = %tenant_id,
            plugin_id = %plugin_id,
            action = %action,
            success = outcome.is_success(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            fuel_consumed = outcome.fuel_consumed,
            "action finished"
        );
        Ok(outcome)
    }

    fn settle(
        &self,
        invocation: Invocation,
        tenant_id: &str,
        plugin_id: &str,
        action: &str,
    ) -> ExecutionStatus {
        match invocation {
            Invocation::Returned(bytes) => match parse_envelope(&bytes) {
                Some(Envelope::Data(data)) => ExecutionStatus::Completed(data),
                Some(Envelope::Error(message)) => {
                    ExecutionStatus::Failed(message.chars().take(MAX_ERROR_CHARS).collect())
                }
                None => {
                    warn!(tenant_id, plugin_id, action, "malformed action output");
                    ExecutionStatus::Failed(GENERIC_FAILURE.into())
                }
            },
            Invocation::Interrupted => ExecutionStatus::TimedOut {
                timeout_ms: self.config.timeout_ms,
            },
            Invocation::Trapped(detail) => {
                warn!(tenant_id, plugin_id, action, detail = %detail, "action trapped");
                ExecutionStatus::Failed(GENERIC_FAILURE.into())
            }
        }
    }
}

/// Loads and invokes the handler on a blocking-pool thread.
///
/// Compilation cannot be interrupted, and epoch bumps made while it runs
/// are not seen by the store, so the deadline is checked again before the
/// guest is entered.
fn run_blocking(
    runtime: &PluginRuntime,
    bundle: &[u8],
    ctx: &CapabilityContext,
    config: &SandboxConfig,
    http: Option<HttpBridge>,
    deadline: Instant,
) -> SandboxResult<RunReport> {
    let mut plugin = runtime.load(bundle, ctx, config, http)?;
    let input = ctx.input_document()?;
    if Instant::now() >= deadline {
        return Ok(RunReport {
            invocation: Invocation::Interrupted,
            fuel_consumed: 0,
            peak_memory_bytes: 0,
            memory_limit_hit: false,
        });
    }
    let invocation = plugin.invoke(&input);
    Ok(RunReport {
        invocation,
        fuel_consumed: plugin.fuel_consumed(),
        peak_memory_bytes: plugin.peak_memory_bytes(),
        memory_limit_hit: plugin.memory_limit_hit(),
    })
}

/// Bumps the epoch until the blocking task observes the interrupt.
async fn interrupt<T>(engine: &Engine, task: &mut JoinHandle<T>) {
    let give_up = Instant::now() + INTERRUPT_GRACE;
    loop {
        engine.increment_epoch();
        if tokio::time::timeout(INTERRUPT_POLL, &mut *task).await.is_ok() {
            return;
        }
        if Instant::now() >= give_up {
            warn!("plugin did not stop after interruption, abandoning its task");
            return;
        }
    }
}

enum Envelope {
    Data(Value),
    Error(String),
}

/// Accepts exactly `{"data": <value>}` or `{"error": "<message>"}`.
fn parse_envelope(bytes: &[u8]) -> Option<Envelope> {
    let Value::Object(mut obj) = serde_json::from_slice(bytes).ok()? else {
        return None;
    };
    if obj.len() != 1 {
        return None;
    }
    match (obj.remove("data"), obj.remove("error")) {
        (Some(data), None) => Some(Envelope::Data(data)),
        (None, Some(Value::String(message))) => Some(Envelope::Error(message)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_accepts_data_and_error_only() {
        assert!(matches!(
            parse_envelope(br#"{"data":{"id":1}}"#),
            Some(Envelope::Data(v)) if v == json!({"id": 1})
        ));
        assert!(matches!(
            parse_envelope(br#"{"error":"declined"}"#),
            Some(Envelope::Error(m)) if m == "declined"
        ));
        assert!(parse_envelope(br#"{"error":42}"#).is_none());
        assert!(parse_envelope(br#"{"data":1,"error":"x"}"#).is_none());
        assert!(parse_envelope(b"not json").is_none());
        assert!(parse_envelope(b"[1,2]").is_none());
    }

    // ── Deadline ────────────────────────────────────────────────────

    fn spinning_bundle() -> Vec<u8> {
        wat::parse_str(
            r#"(module
                 (memory (export "memory") 1)
                 (func (export "alloc") (param i32) (result i32) (i32.const 4096))
                 (func (export "action:spin") (param i32 i32) (result i64)
                   (loop $forever (br $forever))
                   (i64.const 0)))"#,
        )
        .unwrap()
    }

    fn spin_ctx() -> CapabilityContext {
        CapabilityContext::builder(
            warden_types::TenantId::parse("acme").unwrap(),
            warden_types::PluginId::parse("spinner").unwrap(),
            "spin",
        )
        .build()
    }

    #[test]
    fn guest_is_not_entered_once_deadline_passed_during_load() {
        let runtime = PluginRuntime::new().unwrap();
        let config = SandboxConfig::default();
        let deadline = Instant::now();
        std::thread::sleep(Duration::from_millis(5));

        let report =
            run_blocking(&runtime, &spinning_bundle(), &spin_ctx(), &config, None, deadline)
                .unwrap();
        assert!(matches!(report.invocation, Invocation::Interrupted));
        assert_eq!(report.fuel_consumed, 0);
    }

    #[test]
    fn load_errors_still_surface_after_deadline() {
        let runtime = PluginRuntime::new().unwrap();
        let result = run_blocking(
            &runtime,
            b"\0asm-not-really",
            &spin_ctx(),
            &SandboxConfig::default(),
            None,
            Instant::now(),
        );
        assert!(matches!(result, Err(SandboxError::Compilation(_))));
    }

    #[test]
    fn timed_out_result_names_the_deadline() {
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::TimedOut { timeout_ms: 250 },
            elapsed: Duration::from_millis(260),
            fuel_consumed: 0,
        };
        let result = outcome.into_result("charge");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("action timed out after 250ms"));
    }
}
