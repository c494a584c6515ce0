//! End-to-end tests through the engine facade.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use warden_audit::{AuditAction, AuditQuery};
use warden_config::{ConfigMap, ConfigSchema};
use warden_engine::{
    BundleError, BundleStore, EngineConfig, ErrorKind, Installation, MemoryBundleStore,
    MemoryInstallationRegistry, OperatorSecrets, PluginEngine,
};
use warden_types::{ActorContext, ExecutionRequest, PluginId, TenantId};

// ── Fixtures ────────────────────────────────────────────────────

const BUNDLE_REF: &str = "stripe-pay/1.0.0.wasm";

/// Wraps the input document as `{"data": <input>}`.
const ECHO_WAT: &str = r#"(module
  (memory (export "memory") 1)
  (global $bump (mut i32) (i32.const 4096))
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $bump))
    (global.set $bump (i32.add (global.get $bump) (local.get $len)))
    (local.get $ptr))
  (data (i32.const 16) "{\"data\":")
  (data (i32.const 32) "{\"error\":\"card declined\"}")
  (func (export "action:charge") (param $ptr i32) (param $len i32) (result i64)
    (local $out i32)
    (local.set $out (call $alloc (i32.add (local.get $len) (i32.const 9))))
    (memory.copy (local.get $out) (i32.const 16) (i32.const 8))
    (memory.copy (i32.add (local.get $out) (i32.const 8)) (local.get $ptr) (local.get $len))
    (i32.store8
      (i32.add (i32.add (local.get $out) (i32.const 8)) (local.get $len))
      (i32.const 125))
    (i64.or
      (i64.shl (i64.extend_i32_u (local.get $out)) (i64.const 32))
      (i64.extend_i32_u (i32.add (local.get $len) (i32.const 9)))))
  (func (export "action:decline") (param i32 i32) (result i64)
    (i64.or (i64.shl (i64.const 32) (i64.const 32)) (i64.const 25)))
  (func (export "action:spin") (param i32 i32) (result i64)
    (loop $forever (br $forever))
    (i64.const 0)))"#;

const SAFE_SOURCE: &str = r#"import React from 'react';
export default function Checkout() {
  return React.createElement('button', null, 'Pay');
}
"#;

/// Counts fetches so tests can prove the sandbox was never reached.
#[derive(Default)]
struct CountingBundles {
    inner: MemoryBundleStore,
    fetches: AtomicUsize,
}

#[async_trait]
impl BundleStore for CountingBundles {
    async fn fetch_bundle_source(&self, bundle_ref: &str) -> Result<Vec<u8>, BundleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_bundle_source(bundle_ref).await
    }
}

struct Fixture {
    engine: PluginEngine,
    registry: Arc<MemoryInstallationRegistry>,
    bundles: Arc<CountingBundles>,
    tenant: TenantId,
    plugin: PluginId,
    actor: ActorContext,
}

fn secrets() -> OperatorSecrets {
    OperatorSecrets::new("encryption-secret", "signing-secret")
}

async fn fixture_with(config: EngineConfig) -> Fixture {
    let registry = Arc::new(MemoryInstallationRegistry::new());
    let bundles = Arc::new(CountingBundles::default());
    bundles
        .inner
        .insert(BUNDLE_REF, wat::parse_str(ECHO_WAT).unwrap())
        .await;
    let engine =
        PluginEngine::in_memory(config, &secrets(), registry.clone(), bundles.clone()).unwrap();
    Fixture {
        engine,
        registry,
        bundles,
        tenant: TenantId::parse("acme").unwrap(),
        plugin: PluginId::parse("stripe-pay").unwrap(),
        actor: ActorContext::user("u-1").with_ip_address("10.0.0.7"),
    }
}

async fn fixture() -> Fixture {
    fixture_with(EngineConfig::default()).await
}

fn map(v: Value) -> ConfigMap {
    match v {
        Value::Object(m) => m,
        _ => panic!("expected object"),
    }
}

fn schema() -> ConfigSchema {
    ConfigSchema {
        sensitive_fields: vec!["apiKey".into()],
        ..Default::default()
    }
}

impl Fixture {
    async fn install(&self, installation: Installation) {
        self.registry
            .install(self.tenant.clone(), self.plugin.clone(), installation)
            .await;
    }

    async fn save_default_config(&self) {
        self.engine
            .save_config(
                &self.tenant,
                &self.plugin,
                "1.0.0",
                map(json!({"apiKey": "sk_live_abc", "displayName": "Acme"})),
                Some(schema()),
                &self.actor,
            )
            .await
            .unwrap();
    }

    fn request(&self, action: &str) -> ExecutionRequest {
        ExecutionRequest::new(self.tenant.clone(), self.plugin.clone(), action)
            .with_parameters(json!({"amount": 4200}))
    }

    fn fetches(&self) -> usize {
        self.bundles.fetches.load(Ordering::SeqCst)
    }
}

// ── Configuration ───────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_public_view_hides_secret() {
    let f = fixture().await;
    f.save_default_config().await;

    let public = f
        .engine
        .get_public_config(&f.tenant, &f.plugin)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Value::Object(public), json!({"displayName": "Acme"}));

    let full = f.engine.get_config(&f.tenant, &f.plugin, &f.actor).await.unwrap();
    assert_eq!(full["apiKey"], "sk_live_abc");
    assert_eq!(full["displayName"], "Acme");
}

#[tokio::test]
async fn missing_config_maps_to_not_found() {
    let f = fixture().await;
    let err = f.engine.get_config(&f.tenant, &f.plugin, &f.actor).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn audit_log_is_newest_first() {
    let f = fixture().await;
    f.save_default_config().await;
    f.engine.get_config(&f.tenant, &f.plugin, &f.actor).await.unwrap();
    assert!(f.engine.delete_config(&f.tenant, &f.plugin, &f.actor).await.unwrap());

    let entries = f
        .engine
        .list_audit_logs(&AuditQuery::new(f.tenant.clone()).plugin(f.plugin.clone()))
        .await
        .unwrap();
    let actions: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Delete, AuditAction::View, AuditAction::Create]
    );
    assert!(entries.iter().all(|e| e.ip_address.as_deref() == Some("10.0.0.7")));
}

#[tokio::test]
async fn validate_config_uses_stored_schema() {
    let f = fixture().await;
    let mut schema = schema();
    schema.required.push("apiKey".into());
    f.engine
        .save_config(
            &f.tenant,
            &f.plugin,
            "1.0.0",
            map(json!({"apiKey": "sk_live_abc"})),
            Some(schema),
            &f.actor,
        )
        .await
        .unwrap();

    let report = f
        .engine
        .validate_config(&f.tenant, &f.plugin, &map(json!({"displayName": "Acme"})))
        .await
        .unwrap();
    assert!(!report.valid);
    assert_eq!(report.errors[0].field, "apiKey");
}

// ── Code trust ──────────────────────────────────────────────────

#[tokio::test]
async fn scenario_b_child_process_is_rejected() {
    let f = fixture().await;
    let report = f.engine.validate_plugin_code(
        "const cp = require('child_process');\nexport default cp;",
        "plugin.js",
    );
    assert!(!report.safe);
    assert!(
        report
            .risks
            .iter()
            .any(|r| r.to_lowercase().contains("process execution"))
    );
}

#[tokio::test]
async fn sign_refuses_unsafe_code() {
    let f = fixture().await;
    let err = f
        .engine
        .sign_plugin("eval(payload); export default 1;", "plugin.js", &f.plugin, "1.0.0")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityRejected);
}

#[tokio::test]
async fn signed_source_verifies_and_tamper_fails() {
    let f = fixture().await;
    let signature = f
        .engine
        .sign_plugin(SAFE_SOURCE, "checkout.jsx", &f.plugin, "1.0.0")
        .unwrap();

    assert!(f.engine.verify_plugin_signature(
        SAFE_SOURCE.as_bytes(),
        &f.plugin,
        "1.0.0",
        &signature
    ));
    let tampered = SAFE_SOURCE.replace("Pay", "Pwn");
    assert!(!f.engine.verify_plugin_signature(
        tampered.as_bytes(),
        &f.plugin,
        "1.0.0",
        &signature
    ));
    assert!(!f.engine.verify_plugin_signature(
        SAFE_SOURCE.as_bytes(),
        &f.plugin,
        "1.0.1",
        &signature
    ));
}

// ── Execution ───────────────────────────────────────────────────

#[tokio::test]
async fn scenario_c_not_installed_never_reaches_sandbox() {
    let f = fixture().await;
    f.save_default_config().await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(f.fetches(), 0);
}

#[tokio::test]
async fn disabled_plugin_never_reaches_sandbox() {
    let f = fixture().await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF).disabled()).await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disabled);
    assert_eq!(f.fetches(), 0);
}

#[tokio::test]
async fn missing_config_stops_before_bundle_fetch() {
    let f = fixture().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF)).await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(f.fetches(), 0);
}

#[tokio::test]
async fn signed_bundle_executes_with_decrypted_config() {
    let f = fixture().await;
    f.save_default_config().await;
    let bundle = wat::parse_str(ECHO_WAT).unwrap();
    let signature = f.engine.sign_bundle(&bundle, &f.plugin, "1.0.0").unwrap();
    f.install(Installation::new("1.0.0", BUNDLE_REF).with_signature(signature))
        .await;

    let result = f
        .engine
        .execute_action(
            f.request("charge").with_metadata(json!({"orderId": "o-9"})),
            &f.actor,
        )
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.action, "charge");
    let doc = result.data.unwrap();
    assert_eq!(doc["config"]["apiKey"], "sk_live_abc");
    assert_eq!(doc["parameters"]["amount"], 4200);
    assert_eq!(doc["metadata"]["orderId"], "o-9");

    let views = f
        .engine
        .list_audit_logs(&AuditQuery::new(f.tenant.clone()))
        .await
        .unwrap();
    assert_eq!(views[0].action, AuditAction::View);
    assert_eq!(views[0].sensitive_fields_accessed, vec!["apiKey".to_string()]);
}

#[tokio::test]
async fn tampered_bundle_fails_signature_check() {
    let f = fixture().await;
    f.save_default_config().await;
    let signature = f
        .engine
        .sign_bundle(b"some other bundle", &f.plugin, "1.0.0")
        .unwrap();
    f.install(Installation::new("1.0.0", BUNDLE_REF).with_signature(signature))
        .await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    assert_eq!(err.public_message(), "plugin signature is invalid");
}

#[tokio::test]
async fn unsigned_bundle_rejected_when_signatures_required() {
    let mut config = EngineConfig::default();
    config.sandbox.require_signed_bundles = true;
    let f = fixture_with(config).await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF)).await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[tokio::test]
async fn missing_bundle_is_not_found() {
    let f = fixture().await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", "stripe-pay/9.9.9.wasm")).await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.public_message(), "plugin bundle not found");
}

#[tokio::test]
async fn unknown_action_is_not_found() {
    let f = fixture().await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF)).await;

    let err = f
        .engine
        .execute_action(f.request("refund"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn handler_error_is_a_failed_result() {
    let f = fixture().await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF)).await;

    let result = f
        .engine
        .execute_action(f.request("decline"), &f.actor)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("card declined"));
    assert_eq!(result.data, None);
}

#[tokio::test]
async fn forbidden_import_is_security_rejected() {
    let f = fixture().await;
    f.save_default_config().await;
    f.bundles
        .inner
        .insert(
            "evil/1.0.0.wasm",
            wat::parse_str(
                r#"(module
                     (import "env" "read_file" (func (param i32 i32) (result i32)))
                     (memory (export "memory") 1)
                     (func (export "alloc") (param i32) (result i32) (i32.const 0))
                     (func (export "action:charge") (param i32 i32) (result i64) (i64.const 0)))"#,
            )
            .unwrap(),
        )
        .await;
    f.install(Installation::new("1.0.0", "evil/1.0.0.wasm")).await;

    let err = f
        .engine
        .execute_action(f.request("charge"), &f.actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityRejected);
}

#[tokio::test]
async fn runaway_handler_times_out() {
    let mut config = EngineConfig::default();
    config.sandbox.timeout_ms = 200;
    config.sandbox.fuel_per_call = u64::MAX / 2;
    let f = fixture_with(config).await;
    f.save_default_config().await;
    f.install(Installation::new("1.0.0", BUNDLE_REF)).await;

    let result = f
        .engine
        .execute_action(f.request("spin"), &f.actor)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("action timed out after 200ms"));
}

// ── Persistence ─────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_engine_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let tenant = TenantId::parse("acme").unwrap();
    let plugin = PluginId::parse("stripe-pay").unwrap();
    let actor = ActorContext::default();
    let open = || {
        PluginEngine::open(
            EngineConfig::default(),
            &secrets(),
            dir.path(),
            Arc::new(MemoryInstallationRegistry::new()),
            Arc::new(MemoryBundleStore::new()),
        )
        .unwrap()
    };

    {
        let engine = open();
        engine
            .save_config(
                &tenant,
                &plugin,
                "1.0.0",
                map(json!({"apiKey": "sk_live_abc", "displayName": "Acme"})),
                Some(schema()),
                &actor,
            )
            .await
            .unwrap();
    }

    let engine = open();
    let config = engine.get_config(&tenant, &plugin, &actor).await.unwrap();
    assert_eq!(config["apiKey"], "sk_live_abc");
    let entries = engine
        .list_audit_logs(&AuditQuery::new(tenant.clone()))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}
