//! Save targets for downloaded artifacts.
//!
//! [`crate::workspace::Workspace::download`] wraps each artifact in a scoped
//! blob handle and passes it to a [`SaveTarget`]; the handle is released as
//! soon as `save` returns, whatever the outcome.

use crate::blob::BlobHandle;
use crate::error::FileKitError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Somewhere a downloaded artifact can be written.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    /// Persist `blob` under `name`, returning where it ended up.
    async fn save(&self, name: &str, blob: &BlobHandle) -> Result<PathBuf, FileKitError>;
}

/// Writes artifacts into a directory.
///
/// Writes are atomic: bytes go to a temporary sibling first and are renamed
/// into place, so a failed save never leaves a partial file behind.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SaveTarget for DirectoryTarget {
    async fn save(&self, name: &str, blob: &BlobHandle) -> Result<PathBuf, FileKitError> {
        let fail = |detail: String| FileKitError::SaveFailed {
            name: name.to_string(),
            detail,
        };
        // Artifact names come from user file names; never let them escape `dir`.
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| fail("not a valid file name".into()))?;
        let path = self.dir.join(file_name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fail(format!("{}: {e}", self.dir.display())))?;

        let tmp_path = self.dir.join(format!(".{}.part", file_name.to_string_lossy()));
        if let Err(e) = tokio::fs::write(&tmp_path, blob.bytes()).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(fail(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(fail(e.to_string()));
        }

        debug!("Saved {} → {}", blob.url(), path.display());
        Ok(path)
    }
}
