//! Blob storage for uploaded PDFs and cover images.

use crate::error::{AppError, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// A blob found in the store.
#[derive(Debug, Clone)]
pub struct LocatedBlob {
    /// Filesystem path that can be opened for streaming.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Storage for opaque files referenced by relative path.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `dir` with a generated name and the given extension.
    /// Returns the relative blob path.
    fn put(&self, dir: &str, extension: &str, data: &[u8]) -> Result<String>;

    /// Locate a blob, `None` when it does not exist.
    fn locate(&self, path: &str) -> Result<Option<LocatedBlob>>;

    /// Read a blob fully, `None` when it does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    fn delete(&self, path: &str) -> Result<()>;
}

/// Delete a blob, logging instead of failing.
pub fn delete_best_effort(store: &dyn BlobStore, path: &str) {
    if let Err(e) = store.delete(path) {
        tracing::warn!(path = %path, error = %e, "Failed to delete blob");
    }
}

/// Blob store on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative blob path, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !safe {
            return Err(AppError::Internal(format!("Invalid blob path: {}", path)));
        }

        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, dir: &str, extension: &str, data: &[u8]) -> Result<String> {
        let path = format!("{}/{}.{}", dir, uuid::Uuid::new_v4(), extension);
        let full = self.resolve(&path)?;

        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, data)?;

        tracing::debug!(path = %path, bytes = data.len(), "Stored blob");
        Ok(path)
    }

    fn locate(&self, path: &str) -> Result<Option<LocatedBlob>> {
        let full = self.resolve(path)?;
        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_file() => Ok(Some(LocatedBlob {
                path: full,
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match std::fs::read(&full) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => {
                tracing::debug!(path = %path, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
