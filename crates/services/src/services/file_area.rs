//! Process-lifetime scratch directory for uploads and generated exports.
//!
//! Every request works in its own scope directory `<area>/<scope-id>/`, so
//! concurrent requests never share a path. The whole area is removed when
//! the last handle is dropped.

use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use uuid::Uuid;

pub struct TempFileArea {
    root: TempDir,
}

impl TempFileArea {
    /// Create a fresh area inside `parent`
    pub fn new_in(parent: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let root = tempfile::Builder::new()
            .prefix("topology-conversion-")
            .tempdir_in(parent)?;
        tracing::debug!("Temporary file area at {}", root.path().display());
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn scope_dir(&self, scope: Uuid) -> PathBuf {
        self.root.path().join(scope.to_string())
    }

    /// Write `bytes` as `filename` inside the scope directory. `filename`
    /// must already be sanitized.
    pub async fn write(&self, scope: Uuid, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to write unsafe file name {filename:?}"),
            ));
        }
        let dir = self.scope_dir(scope);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove a scope directory with everything in it; a missing directory
    /// is not an error
    pub async fn release(&self, scope: Uuid) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.scope_dir(scope)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Number of files currently stored, across all scopes
    pub fn file_count(&self) -> io::Result<usize> {
        let mut count = 0;
        for scope in std::fs::read_dir(self.root.path())? {
            let scope = scope?;
            if scope.file_type()?.is_dir() {
                count += std::fs::read_dir(scope.path())?.count();
            } else {
                count += 1;
            }
        }
        Ok(count)
    }
}
