//! Compiled plugin bundle retrieval.
//!
//! The engine only reads bundles. Misses and transient I/O failures are
//! distinct so callers can tell "never published" from "try again".

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle not found: {0}")]
    NotFound(String),

    #[error("bundle i/o error: {0}")]
    Io(String),
}

#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn fetch_bundle_source(&self, bundle_ref: &str) -> Result<Vec<u8>, BundleError>;
}

/// In-memory bundle store.
#[derive(Debug, Default)]
pub struct MemoryBundleStore {
    bundles: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bundle_ref: impl Into<String>, bytes: Vec<u8>) {
        self.bundles.write().await.insert(bundle_ref.into(), bytes);
    }
}

#[async_trait]
impl BundleStore for MemoryBundleStore {
    async fn fetch_bundle_source(&self, bundle_ref: &str) -> Result<Vec<u8>, BundleError> {
        self.bundles
            .read()
            .await
            .get(bundle_ref)
            .cloned()
            .ok_or_else(|| BundleError::NotFound(bundle_ref.to_string()))
    }
}

/// Bundles stored as files under a root directory. A bundle ref is a
/// relative path below the root.
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    root: PathBuf,
}

impl FsBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Refs that would escape the root are treated as missing.
    fn resolve(&self, bundle_ref: &str) -> Option<PathBuf> {
        let relative = Path::new(bundle_ref);
        let contained = !bundle_ref.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl BundleStore for FsBundleStore {
    async fn fetch_bundle_source(&self, bundle_ref: &str) -> Result<Vec<u8>, BundleError> {
        let path = self
            .resolve(bundle_ref)
            .ok_or_else(|| BundleError::NotFound(bundle_ref.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(bundle_ref, bytes = bytes.len(), "bundle loaded");
                Ok(bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BundleError::NotFound(bundle_ref.to_string()))
            }
            Err(e) => Err(BundleError::Io(format!("{bundle_ref}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_reads_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stripe-pay")).unwrap();
        std::fs::write(dir.path().join("stripe-pay/1.0.0.wasm"), b"\0asm").unwrap();
        let store = FsBundleStore::new(dir.path());

        assert_eq!(
            store.fetch_bundle_source("stripe-pay/1.0.0.wasm").await.unwrap(),
            b"\0asm"
        );
        assert!(matches!(
            store.fetch_bundle_source("stripe-pay/2.0.0.wasm").await,
            Err(BundleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_refuses_escaping_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBundleStore::new(dir.path().join("bundles"));
        for bad in ["../secret.wasm", "/etc/passwd", "", "a/../../b"] {
            assert!(matches!(
                store.fetch_bundle_source(bad).await,
                Err(BundleError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBundleStore::new();
        store.insert("p/1.wasm", vec![1, 2, 3]).await;
        assert_eq!(store.fetch_bundle_source("p/1.wasm").await.unwrap(), vec![1, 2, 3]);
        assert!(store.fetch_bundle_source("p/2.wasm").await.is_err());
    }
}
