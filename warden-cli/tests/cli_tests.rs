use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use warden_cli::{RunArgs, parse_object, run_bundle, sign_file, validate_file, validator, verify_file};
use warden_engine::EngineConfig;
use warden_security::PluginSigner;
use warden_types::{PluginId, TenantId};

const SAFE_SOURCE: &str = "import React from 'react';\nexport default function Badge() { return React.createElement('span'); }\n";

fn plugin() -> PluginId {
    PluginId::parse("badge").unwrap()
}

// ── validate / sign / verify ────────────────────────────────────

#[test]
fn validate_flags_eval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugin.js");
    fs::write(&path, "export default () => eval(input);").unwrap();

    let report = validate_file(&validator(&EngineConfig::default()), &path).unwrap();
    assert!(!report.safe);
}

#[test]
fn sign_then_verify_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("badge.jsx");
    fs::write(&source, SAFE_SOURCE).unwrap();
    let signer = PluginSigner::new("cli-secret").unwrap();
    let v = validator(&EngineConfig::default());

    let signature = sign_file(&v, &signer, &source, &plugin(), "1.0.0", false).unwrap();
    let sig_path = dir.path().join("badge.sig.json");
    fs::write(&sig_path, serde_json::to_string(&signature).unwrap()).unwrap();

    assert!(verify_file(&signer, &source, &plugin(), "1.0.0", &sig_path).unwrap());
    assert!(!verify_file(&signer, &source, &plugin(), "2.0.0", &sig_path).unwrap());

    fs::write(&source, SAFE_SOURCE.replace("span", "div")).unwrap();
    assert!(!verify_file(&signer, &source, &plugin(), "1.0.0", &sig_path).unwrap());
}

#[test]
fn sign_refuses_unsafe_source_but_accepts_bundles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evil.js");
    fs::write(&path, "require('child_process'); export default 1;").unwrap();
    let signer = PluginSigner::new("cli-secret").unwrap();
    let v = validator(&EngineConfig::default());

    let err = sign_file(&v, &signer, &path, &plugin(), "1.0.0", false).unwrap_err();
    assert!(err.to_string().contains("refusing to sign"));
    assert!(sign_file(&v, &signer, &path, &plugin(), "1.0.0", true).is_ok());
}

#[test]
fn verify_rejects_garbage_signature_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("badge.jsx");
    let sig_path = dir.path().join("badge.sig.json");
    fs::write(&source, SAFE_SOURCE).unwrap();
    fs::write(&sig_path, "not json").unwrap();
    let signer = PluginSigner::new("cli-secret").unwrap();

    assert!(verify_file(&signer, &source, &plugin(), "1.0.0", &sig_path).is_err());
}

// ── run ─────────────────────────────────────────────────────────

#[test]
fn parse_object_accepts_only_objects() {
    assert!(parse_object(None).unwrap().is_empty());
    assert_eq!(parse_object(Some(r#"{"a":1}"#)).unwrap()["a"], 1);
    assert!(parse_object(Some("[1]")).is_err());
    assert!(parse_object(Some("{")).is_err());
}

#[tokio::test]
async fn run_executes_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("badge.wasm");
    let wasm = wat::parse_str(
        r#"(module
             (memory (export "memory") 1)
             (func (export "alloc") (param i32) (result i32) (i32.const 4096))
             (data (i32.const 16) "{\"data\":{\"label\":\"ok\"}}")
             (func (export "action:render") (param i32 i32) (result i64)
               (i64.or (i64.shl (i64.const 16) (i64.const 32)) (i64.const 23))))"#,
    )
    .unwrap();
    fs::write(&bundle, wasm).unwrap();

    let result = run_bundle(
        &EngineConfig::default(),
        &bundle,
        RunArgs {
            tenant_id: TenantId::parse("local").unwrap(),
            plugin_id: plugin(),
            action: "render".into(),
            parameters: json!({}),
            config: parse_object(None).unwrap(),
        },
    )
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(result.data, Some(json!({"label": "ok"})));
}
