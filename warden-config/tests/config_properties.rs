//! Property-based tests for the configuration store.
//!
//! These verify that the public/secret split holds for arbitrary schemas and
//! inputs, and that the public view never exposes an encrypted field.

use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use warden_audit::{AuditLog, MemoryAuditSink};
use warden_config::{ConfigMap, ConfigRepository, ConfigSchema, ConfigStore, MemoryConfigRepository};
use warden_crypto::CryptoVault;
use warden_types::{ActorContext, PluginId, TenantId};

fn field_name() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
    ]
}

fn config() -> impl Strategy<Value = ConfigMap> {
    prop::collection::btree_map(field_name(), field_value(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn save_partitions_by_sensitive_fields(
        cfg in config(),
        sensitive in prop::collection::btree_set(field_name(), 0..5),
    ) {
        let rt = runtime();
        let repo = Arc::new(MemoryConfigRepository::new());
        let store = ConfigStore::new(
            repo.clone(),
            Arc::new(CryptoVault::from_secret("prop-secret").unwrap()),
            AuditLog::new(Arc::new(MemoryAuditSink::new())),
        );
        let tenant = TenantId::parse("acme").unwrap();
        let plugin = PluginId::parse("p").unwrap();
        let schema = ConfigSchema {
            sensitive_fields: sensitive.iter().cloned().collect(),
            ..Default::default()
        };

        let record = rt
            .block_on(store.save(&tenant, &plugin, "1", cfg.clone(), Some(schema), &ActorContext::default()))
            .unwrap();

        for key in cfg.keys() {
            if sensitive.contains(key) {
                prop_assert!(record.encrypted_fields.contains_key(key));
                prop_assert!(!record.public_fields.contains_key(key));
            } else {
                prop_assert!(record.public_fields.contains_key(key));
                prop_assert!(!record.encrypted_fields.contains_key(key));
            }
        }

        let public = rt.block_on(store.get_public(&tenant, &plugin)).unwrap().unwrap();
        let public_keys: BTreeSet<_> = public.keys().cloned().collect();
        let secret_keys: BTreeSet<_> = record.encrypted_fields.keys().cloned().collect();
        prop_assert!(public_keys.is_disjoint(&secret_keys));

        let stored = rt.block_on(repo.get(&tenant, &plugin)).unwrap().unwrap();
        prop_assert_eq!(stored.revision, 1);

        let full = rt.block_on(store.get(&tenant, &plugin, &ActorContext::default())).unwrap();
        prop_assert_eq!(full, cfg);
    }
}
