//! Tool requests: the bridge between a tool id + options and the engine.
//!
//! The presentation layer names a tool by id (`image-compress`, `pdf-merge`,
//! …) and passes a loosely-typed [`ToolOptions`] record. [`ToolRequest::from_parts`]
//! turns the pair into a typed request, and [`Transform`] is the seam the
//! workspace calls to run it. Custom transformations implement `Transform`
//! directly.

use crate::artifact::Artifact;
use crate::config::DEFAULT_QUALITY;
use crate::engine::{self, EncodeInput, PageRange};
use crate::error::FileKitError;
use crate::intake::FileDescriptor;
use crate::progress::{ProgressCallback, ProgressTracker};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default conversion target when none is given.
pub const DEFAULT_TARGET_FORMAT: &str = "webp";

/// Every tool id understood by [`ToolRequest::from_parts`].
pub const TOOL_IDS: &[&str] = &[
    "image-compress",
    "image-convert",
    "pdf-merge",
    "pdf-split",
    "base64-encode",
    "base64-decode",
];

/// Tool-specific options as supplied by the caller.
///
/// Only the fields the chosen tool reads are consulted; the rest are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOptions {
    /// Compression quality in `(0, 1]`.
    pub quality: Option<f32>,
    /// Conversion target: `webp`, `jpg`, `jpeg`, `png` or `bmp`.
    pub target_format: Option<String>,
    /// Split ranges, e.g. `"1-3,5"`.
    pub page_ranges: Option<String>,
}

/// A fully-resolved tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    CompressImage { quality: f32 },
    ConvertImage { target_format: String },
    MergePdfs,
    SplitPdf { ranges: Vec<PageRange> },
    EncodeBase64,
    DecodeBase64,
}

impl ToolRequest {
    /// Resolve a tool id and its options.
    ///
    /// Unknown ids are [`FileKitError::NotFound`]; malformed options are
    /// [`FileKitError::Validation`]. A split without ranges resolves to an
    /// empty range list, which the engine rejects when the job runs.
    pub fn from_parts(tool_id: &str, options: &ToolOptions) -> Result<Self, FileKitError> {
        let request = match tool_id {
            "image-compress" => {
                let quality = options.quality.unwrap_or(DEFAULT_QUALITY);
                if !(quality > 0.0 && quality <= 1.0) {
                    return Err(FileKitError::Validation(format!(
                        "quality must be in (0, 1], got {quality}"
                    )));
                }
                ToolRequest::CompressImage { quality }
            }
            "image-convert" => ToolRequest::ConvertImage {
                target_format: options
                    .target_format
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .unwrap_or(DEFAULT_TARGET_FORMAT)
                    .to_lowercase(),
            },
            "pdf-merge" => ToolRequest::MergePdfs,
            "pdf-split" => ToolRequest::SplitPdf {
                ranges: match options.page_ranges.as_deref() {
                    Some(s) => PageRange::parse_list(s)?,
                    None => Vec::new(),
                },
            },
            "base64-encode" => ToolRequest::EncodeBase64,
            "base64-decode" => ToolRequest::DecodeBase64,
            other => {
                return Err(FileKitError::NotFound {
                    id: other.to_string(),
                })
            }
        };
        Ok(request)
    }

    /// The tool id this request was resolved from.
    pub fn id(&self) -> &'static str {
        match self {
            ToolRequest::CompressImage { .. } => "image-compress",
            ToolRequest::ConvertImage { .. } => "image-convert",
            ToolRequest::MergePdfs => "pdf-merge",
            ToolRequest::SplitPdf { .. } => "pdf-split",
            ToolRequest::EncodeBase64 => "base64-encode",
            ToolRequest::DecodeBase64 => "base64-decode",
        }
    }
}

/// Per-job services handed to a [`Transform`].
pub struct JobContext {
    tracker: Arc<ProgressTracker>,
    callback: Option<ProgressCallback>,
    concurrency: usize,
}

impl JobContext {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        callback: Option<ProgressCallback>,
        concurrency: usize,
    ) -> Self {
        Self {
            tracker,
            callback,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn callback(&self) -> Option<&ProgressCallback> {
        self.callback.as_ref()
    }

    /// Report real progress; replaces the heuristic estimator for this job.
    pub fn report(&self, done: usize, total: usize) {
        self.tracker.report(done, total);
    }

    /// Run `op` over every file with bounded concurrency.
    ///
    /// Results come back in input order regardless of completion order. The
    /// first failure aborts the batch and is returned; no partial list is
    /// produced.
    pub async fn per_file<'a, F, Fut>(
        &self,
        files: &'a [Arc<FileDescriptor>],
        op: F,
    ) -> Result<Vec<Artifact>, FileKitError>
    where
        F: Fn(&'a FileDescriptor) -> Fut,
        Fut: Future<Output = Result<Artifact, FileKitError>> + 'a,
    {
        let total = files.len();
        let done = AtomicUsize::new(0);
        let (done, op) = (&done, &op);

        let jobs: Vec<_> = files
            .iter()
            .enumerate()
            .map(|(i, file)| async move {
                let index = i + 1;
                if let Some(cb) = &self.callback {
                    cb.on_file_start(index, total, file.name());
                }
                match op(&**file).await {
                    Ok(artifact) => {
                        if let Some(cb) = &self.callback {
                            cb.on_file_complete(index, total, artifact.byte_size);
                        }
                        let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                        self.tracker.report(finished, total);
                        Ok(artifact)
                    }
                    Err(e) => {
                        warn!("File {}/{} '{}' failed: {}", index, total, file.name(), e);
                        if let Some(cb) = &self.callback {
                            cb.on_file_error(index, total, &e.to_string());
                        }
                        Err(e)
                    }
                }
            })
            .collect();

        stream::iter(jobs)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

/// A transformation the workspace can run over the selected files.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Whether the workspace should load every file's bytes before `apply`.
    fn requires_bytes(&self) -> bool {
        true
    }

    async fn apply(
        &self,
        files: &[Arc<FileDescriptor>],
        ctx: &JobContext,
    ) -> Result<Vec<Artifact>, FileKitError>;
}

#[async_trait]
impl Transform for ToolRequest {
    fn name(&self) -> &str {
        self.id()
    }

    // Merge checks its byte cap before reading, so it loads lazily itself.
    fn requires_bytes(&self) -> bool {
        !matches!(self, ToolRequest::MergePdfs)
    }

    async fn apply(
        &self,
        files: &[Arc<FileDescriptor>],
        ctx: &JobContext,
    ) -> Result<Vec<Artifact>, FileKitError> {
        debug!("Applying {} to {} file(s)", self.id(), files.len());
        match self {
            ToolRequest::CompressImage { quality } => {
                ctx.per_file(files, |f| engine::compress_image(f, *quality))
                    .await
            }
            ToolRequest::ConvertImage { target_format } => {
                ctx.per_file(files, |f| engine::convert_image_format(f, target_format))
                    .await
            }
            ToolRequest::EncodeBase64 => {
                ctx.per_file(files, |f| engine::encode_base64(EncodeInput::File(f)))
                    .await
            }
            ToolRequest::DecodeBase64 => ctx.per_file(files, |f| engine::decode_file(f)).await,
            ToolRequest::MergePdfs => Ok(vec![engine::merge_pdfs(files).await?]),
            ToolRequest::SplitPdf { ranges } => {
                let (first, rest) = files.split_first().ok_or_else(|| {
                    FileKitError::Validation("split needs a source file".into())
                })?;
                if !rest.is_empty() {
                    warn!(
                        "Split uses only the first file; ignoring {} more",
                        rest.len()
                    );
                }
                engine::split_pdf(first, ranges).await
            }
        }
    }
}
