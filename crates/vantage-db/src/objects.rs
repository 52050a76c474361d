//! Screenshot object storage.

use crate::error::{DatabaseError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Write-once blob storage with public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object, and
    /// return its public URL.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Remove the object under `key`. Removing a missing object succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Object store backed by a local directory served at `public_base_url`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    /// Store objects below `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Directory objects are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL for `key`.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(DatabaseError::ObjectStore {
                key: key.to_string(),
                message: "key must be a relative path without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(key, content_type, size = bytes.len(), "stored object");
        Ok(self.public_url(key))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
