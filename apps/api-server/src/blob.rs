//! File-blob storage is an external S3-compatible object store reached
//! via a client facade, deliberately out of scope for this workspace to
//! implement directly. This crate only needs two operations — put the
//! uploaded bytes under a tenant-isolated key, and mint a short-lived
//! signed download URL for an existing key — so [`BlobStore`] stays
//! narrow, matching the same duck-typed-client-to-interface treatment
//! given to the provider facade.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, storage_key: &str, bytes: &[u8]) -> anyhow::Result<()>;
    /// A URL valid for `ttl` (default 1 h, configurable 5 min-24 h).
    fn signed_url(&self, storage_key: &str, ttl: Duration) -> String;
}

/// Local-disk adapter used until a real S3 client is wired in; the
/// storage-key convention is identical either way, so callers never see
/// the difference.
pub struct LocalDiskBlobStore {
    root: std::path::PathBuf,
}

impl LocalDiskBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalDiskBlobStore {
    async fn put(&self, storage_key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.root.join(storage_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    fn signed_url(&self, storage_key: &str, ttl: Duration) -> String {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        format!("/blob/{storage_key}?expires={}", expires_at.timestamp())
    }
}
