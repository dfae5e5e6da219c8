//! File intake: validate raw inputs and turn them into [`FileDescriptor`]s.
//!
//! Intake never reads file contents. A descriptor only records where its
//! bytes live ([`SourceHandle`]); the bytes are pulled into memory the first
//! time a transformation calls [`FileDescriptor::load`] and are cached on the
//! descriptor afterwards.
//!
//! Per-file problems (too large, wrong type, past the count limit) become
//! [`Rejection`]s and never abort the rest of the selection. Only a source
//! that cannot even be inspected is a hard [`FileKitError::Validation`].

use crate::blob::{BlobHandle, BlobRegistry};
use crate::config::{AcceptedTypes, OverflowPolicy, WorkspaceConfig};
use crate::error::{FileKitError, RejectReason, Rejection};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a file's bytes come from.
#[derive(Debug, Clone)]
pub enum SourceHandle {
    /// A file on disk, read on first [`FileDescriptor::load`].
    Path(PathBuf),
    /// Bytes the caller already holds (drag-and-drop buffers, tests).
    Memory(Arc<[u8]>),
}

impl SourceHandle {
    async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            SourceHandle::Path(p) => tokio::fs::read(p).await.map(Arc::from),
            SourceHandle::Memory(b) => Ok(Arc::clone(b)),
        }
    }
}

/// An unvalidated file as handed over by the caller.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub name: String,
    /// Declared MIME type; empty when unknown.
    pub mime_type: String,
    pub source: SourceHandle,
}

impl RawInput {
    /// A file on disk. The MIME type is guessed from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();
        Self {
            name,
            mime_type,
            source: SourceHandle::Path(path.to_path_buf()),
        }
    }

    /// An in-memory buffer with an explicit MIME type.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: SourceHandle::Memory(bytes.into()),
        }
    }
}

/// Whether a descriptor's bytes are still behind its source handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ready,
    Loaded,
}

/// A validated, accepted file.
pub struct FileDescriptor {
    id: Uuid,
    name: String,
    byte_size: u64,
    mime_type: String,
    source: SourceHandle,
    preview: Option<BlobHandle>,
    bytes: OnceCell<Arc<[u8]>>,
}

impl FileDescriptor {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Preview handle URL for image files.
    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(BlobHandle::url)
    }

    pub fn status(&self) -> FileStatus {
        if self.bytes.initialized() {
            FileStatus::Loaded
        } else {
            FileStatus::Ready
        }
    }

    /// Read the file's bytes, caching them on the descriptor.
    ///
    /// Concurrent callers share a single read.
    pub async fn load(&self) -> Result<Arc<[u8]>, FileKitError> {
        let bytes = self
            .bytes
            .get_or_try_init(|| async {
                debug!("Reading bytes for '{}'", self.name);
                self.source.read().await
            })
            .await
            .map_err(|e| FileKitError::ReadFailed {
                name: self.name.clone(),
                detail: e.to_string(),
            })?;
        Ok(Arc::clone(bytes))
    }

    /// Cheap summary for listings and JSON output.
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            name: self.name.clone(),
            byte_size: self.byte_size,
            mime_type: self.mime_type.clone(),
            preview_url: self.preview_url().map(str::to_string),
            status: self.status(),
        }
    }
}

impl AsRef<FileDescriptor> for FileDescriptor {
    fn as_ref(&self) -> &FileDescriptor {
        self
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("byte_size", &self.byte_size)
            .field("mime_type", &self.mime_type)
            .field("preview", &self.preview_url())
            .field("status", &self.status())
            .finish()
    }
}

/// Serializable view of a [`FileDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub id: Uuid,
    pub name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub preview_url: Option<String>,
    pub status: FileStatus,
}

/// Limits applied by [`select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePolicy {
    pub accepted_types: AcceptedTypes,
    pub max_files: usize,
    pub max_file_size: u64,
    pub overflow: OverflowPolicy,
}

impl From<&WorkspaceConfig> for IntakePolicy {
    fn from(c: &WorkspaceConfig) -> Self {
        Self {
            accepted_types: c.accepted_types.clone(),
            max_files: c.max_files,
            max_file_size: c.max_file_size,
            overflow: c.overflow,
        }
    }
}

/// Outcome of an intake pass.
#[derive(Debug, Default)]
pub struct Selection {
    pub accepted: Vec<FileDescriptor>,
    pub rejected: Vec<Rejection>,
}

/// Validate `inputs` against `policy`.
///
/// Order is preserved: accepted files keep their relative selection order and
/// the count limit keeps the *first* `max_files` of them.
pub async fn select(
    inputs: Vec<RawInput>,
    policy: &IntakePolicy,
    blobs: &BlobRegistry,
) -> Result<Selection, FileKitError> {
    let total = inputs.len();
    let mut selection = Selection::default();
    let mut kept = 0usize;

    for input in inputs {
        let byte_size = source_size(&input).await?;

        if byte_size > policy.max_file_size {
            warn!(
                "Rejected '{}': {} bytes > {} limit",
                input.name, byte_size, policy.max_file_size
            );
            selection.rejected.push(Rejection {
                name: input.name,
                reason: RejectReason::TooLarge {
                    size: byte_size,
                    max: policy.max_file_size,
                },
            });
            continue;
        }

        if !type_accepted(&input.name, &input.mime_type, &policy.accepted_types) {
            warn!("Rejected '{}': type '{}'", input.name, input.mime_type);
            selection.rejected.push(Rejection {
                name: input.name,
                reason: RejectReason::TypeNotAccepted {
                    mime_type: input.mime_type,
                },
            });
            continue;
        }

        if kept >= policy.max_files {
            debug!("Dropping '{}': past max_files", input.name);
            if policy.overflow == OverflowPolicy::Report {
                selection.rejected.push(Rejection {
                    name: input.name,
                    reason: RejectReason::OverLimit {
                        max_files: policy.max_files,
                    },
                });
            }
            continue;
        }

        kept += 1;
        selection.accepted.push(describe(input, byte_size, blobs));
    }

    info!(
        "Intake: {}/{} files accepted, {} rejected",
        selection.accepted.len(),
        total,
        selection.rejected.len()
    );
    Ok(selection)
}

/// Decide whether a file passes the type filter.
///
/// A token matches when the declared MIME type contains it, when the file
/// extension equals it (ignoring case and a leading dot), or when the token
/// contains the extension. `family/*` tokens match any MIME type starting
/// with `family/`.
pub fn type_accepted(name: &str, mime_type: &str, accepted: &AcceptedTypes) -> bool {
    let tokens = match accepted {
        AcceptedTypes::Any => return true,
        AcceptedTypes::Tokens(tokens) => tokens,
    };
    let mime = mime_type.to_lowercase();
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    tokens.iter().any(|token| {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return false;
        }
        if let Some(family) = token.strip_suffix("/*") {
            if mime.starts_with(&format!("{family}/")) {
                return true;
            }
        }
        if !mime.is_empty() && mime.contains(&token) {
            return true;
        }
        if ext.is_empty() {
            return false;
        }
        token.trim_start_matches('.') == ext || token.contains(&ext)
    })
}

async fn source_size(input: &RawInput) -> Result<u64, FileKitError> {
    match &input.source {
        SourceHandle::Memory(b) => Ok(b.len() as u64),
        SourceHandle::Path(p) => {
            let meta = tokio::fs::metadata(p).await.map_err(|e| {
                FileKitError::Validation(format!("cannot read '{}': {e}", p.display()))
            })?;
            if !meta.is_file() {
                return Err(FileKitError::Validation(format!(
                    "'{}' is not a regular file",
                    p.display()
                )));
            }
            Ok(meta.len())
        }
    }
}

fn describe(input: RawInput, byte_size: u64, blobs: &BlobRegistry) -> FileDescriptor {
    let preview = input
        .mime_type
        .starts_with("image/")
        .then(|| blobs.create(input.mime_type.clone(), byte_size, None));

    FileDescriptor {
        id: Uuid::new_v4(),
        name: input.name,
        byte_size,
        mime_type: input.mime_type,
        source: input.source,
        preview,
        bytes: OnceCell::new(),
    }
}
