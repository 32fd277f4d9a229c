// src/store/fs.rs - Filesystem object store
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Object store backed by a directory tree. Paths are interpreted relative
/// to the configured root; traversal outside the root is rejected.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::RemoteIo(format!("illegal object path '{}'", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object '{}'", path)))
            }
            Err(e) => Err(Error::RemoteIo(format!("read '{}': {}", path, e))),
        }
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if fs::try_exists(&full)
            .await
            .map_err(|e| Error::RemoteIo(format!("stat '{}': {}", path, e)))?
        {
            return Err(Error::RemoteIo(format!("object '{}' already exists", path)));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::RemoteIo(format!("mkdir for '{}': {}", path, e)))?;
        }
        fs::write(&full, bytes)
            .await
            .map_err(|e| Error::RemoteIo(format!("write '{}': {}", path, e)))
    }
}
