//! The workspace: one processing job and its state machine.
//!
//! ```text
//!            select                process                ok
//!   Idle ─────────────▶ FilesSelected ─────▶ Processing ─────▶ Completed
//!    ▲                   │  ▲                    │                 │
//!    │                   └──┘ remove_file        │ error           │
//!    │                                           ▼                 │
//!    └──────────────────── reset ─────────── Failed ◀──────────────┘
//!                                                         (reset)
//! ```
//!
//! A [`Workspace`] is a cheap, cloneable handle. Exactly one job is live per
//! workspace: a second [`Workspace::process`] while one is running is refused
//! with [`FileKitError::IllegalState`] and does not disturb the running job.
//! Jobs cannot be cancelled; a job whose `process` future is dropped before it
//! settles is marked `Failed`.

use crate::artifact::Artifact;
use crate::blob::BlobRegistry;
use crate::config::WorkspaceConfig;
use crate::download::SaveTarget;
use crate::error::{FileKitError, Rejection};
use crate::intake::{self, FileDescriptor, FileSummary, IntakePolicy, RawInput};
use crate::progress::ProgressTracker;
use crate::tool::{JobContext, ToolOptions, ToolRequest, Transform};
use futures::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of the workspace's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    FilesSelected,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::FilesSelected => "files-selected",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the job.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub state: JobState,
    pub files: Vec<FileSummary>,
    pub progress: u8,
    pub results: Vec<Artifact>,
    pub error: Option<FileKitError>,
}

struct Job {
    state: JobState,
    files: Vec<Arc<FileDescriptor>>,
    results: Vec<Artifact>,
    error: Option<FileKitError>,
}

impl Job {
    fn new() -> Self {
        Self {
            state: JobState::Idle,
            files: Vec::new(),
            results: Vec::new(),
            error: None,
        }
    }

    fn illegal(&self, operation: &'static str) -> FileKitError {
        FileKitError::IllegalState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn fail(&mut self, error: FileKitError) {
        self.state = JobState::Failed;
        self.results.clear();
        self.error = Some(error);
    }
}

struct Inner {
    config: WorkspaceConfig,
    blobs: BlobRegistry,
    tracker: Arc<ProgressTracker>,
    job: Mutex<Job>,
}

/// Owner of one processing job. Cheap to clone; clones share the job.
#[derive(Clone)]
pub struct Workspace {
    inner: Arc<Inner>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(WorkspaceConfig::default())
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("state", &self.state())
            .field("progress", &self.progress())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Workspace {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                blobs: BlobRegistry::new(),
                tracker: Arc::new(ProgressTracker::new()),
                job: Mutex::new(Job::new()),
            }),
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.inner.config
    }

    /// Registry holding this workspace's previews and download blobs.
    pub fn blobs(&self) -> &BlobRegistry {
        &self.inner.blobs
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn progress(&self) -> u8 {
        self.inner.tracker.current()
    }

    pub fn files(&self) -> Vec<FileSummary> {
        self.lock().files.iter().map(|f| f.summary()).collect()
    }

    pub fn results(&self) -> Vec<Artifact> {
        self.lock().results.clone()
    }

    pub fn error(&self) -> Option<FileKitError> {
        self.lock().error.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let job = self.lock();
        JobSnapshot {
            state: job.state,
            files: job.files.iter().map(|f| f.summary()).collect(),
            progress: self.inner.tracker.current(),
            results: job.results.clone(),
            error: job.error.clone(),
        }
    }

    /// Watch the job's 0–100 progress.
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.inner.tracker.subscribe()
    }

    /// Progress as a stream; yields the current value first, then each change.
    pub fn progress_stream(&self) -> WatchStream<u8> {
        WatchStream::new(self.inner.tracker.subscribe())
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Run intake over `inputs` and select the accepted files.
    ///
    /// Returns the per-file rejections; they never fail the call.
    pub async fn select_inputs(
        &self,
        inputs: Vec<RawInput>,
    ) -> Result<Vec<Rejection>, FileKitError> {
        {
            let job = self.lock();
            if !can_select(job.state) {
                return Err(job.illegal("select files"));
            }
        }
        let policy = IntakePolicy::from(&self.inner.config);
        let selection = intake::select(inputs, &policy, &self.inner.blobs).await?;
        self.select_files(selection.accepted)?;
        Ok(selection.rejected)
    }

    /// Replace the current selection. Clears any previous results.
    ///
    /// Descriptors may come from an intake run under a different policy, so
    /// the count and per-file size caps are checked again here.
    pub fn select_files(&self, files: Vec<FileDescriptor>) -> Result<(), FileKitError> {
        let max = self.inner.config.max_files;
        if files.len() > max {
            return Err(FileKitError::Validation(format!(
                "{} files selected, at most {max} allowed",
                files.len()
            )));
        }
        let max_size = self.inner.config.max_file_size;
        if let Some(big) = files.iter().find(|f| f.byte_size() > max_size) {
            return Err(FileKitError::Validation(format!(
                "'{}' is {} bytes, at most {max_size} allowed",
                big.name(),
                big.byte_size()
            )));
        }
        let mut job = self.lock();
        if !can_select(job.state) {
            return Err(job.illegal("select files"));
        }
        job.files = files.into_iter().map(Arc::new).collect();
        job.results.clear();
        job.error = None;
        job.state = JobState::FilesSelected;
        self.inner.tracker.reset();
        info!("Selected {} file(s)", job.files.len());
        Ok(())
    }

    /// Drop one file from the selection. Returns whether it was present.
    pub fn remove_file(&self, id: Uuid) -> Result<bool, FileKitError> {
        let mut job = self.lock();
        if job.state != JobState::FilesSelected {
            return Err(job.illegal("remove a file"));
        }
        let before = job.files.len();
        job.files.retain(|f| f.id() != id);
        let removed = job.files.len() != before;
        if removed {
            debug!("Removed file {}; {} left", id, job.files.len());
        }
        Ok(removed)
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Resolve `tool_id` with `options` and run it.
    ///
    /// An unknown tool or malformed options fail without touching the job.
    pub async fn process_tool(
        &self,
        tool_id: &str,
        options: &ToolOptions,
    ) -> Result<Vec<Artifact>, FileKitError> {
        let request = ToolRequest::from_parts(tool_id, options)?;
        self.process(&request).await
    }

    /// Run `tool` over the selected files.
    ///
    /// On success the artifacts are stored on the job and returned; on
    /// failure the job moves to `Failed`, progress drops to 0 and the same
    /// error is stored and returned.
    pub async fn process<T: Transform + ?Sized>(
        &self,
        tool: &T,
    ) -> Result<Vec<Artifact>, FileKitError> {
        let files = {
            let mut job = self.lock();
            if job.state != JobState::FilesSelected {
                return Err(job.illegal("process"));
            }
            if job.files.is_empty() {
                return Err(FileKitError::Validation("no files selected".into()));
            }
            let total: u64 = job.files.iter().map(|f| f.byte_size()).sum();
            let limit = self.inner.config.max_batch_size;
            if total > limit {
                warn!("Batch rejected: {} bytes > {} limit", total, limit);
                let err = FileKitError::AggregateLimit { total, limit };
                job.fail(err.clone());
                return Err(err);
            }
            job.state = JobState::Processing;
            job.error = None;
            job.files.clone()
        };

        let started = Instant::now();
        info!("Processing {} file(s) with {}", files.len(), tool.name());
        let tracker = &self.inner.tracker;
        tracker.start();
        let mut guard = SettleGuard::new(self);
        if let Some(cb) = &self.inner.config.progress_callback {
            cb.on_job_start(files.len());
        }

        let estimator = tracker.spawn_estimator(self.inner.config.progress_interval);
        let outcome = self.run(tool, &files).await;
        estimator.stop();

        match outcome {
            Ok(results) => {
                tracker.complete();
                tokio::time::sleep(self.inner.config.settle_delay).await;
                {
                    let mut job = self.lock();
                    job.results = results.clone();
                    job.state = JobState::Completed;
                }
                guard.disarm();
                if let Some(cb) = &self.inner.config.progress_callback {
                    cb.on_job_complete(files.len(), results.len());
                }
                info!(
                    "{} finished: {} artifact(s) in {}ms",
                    tool.name(),
                    results.len(),
                    started.elapsed().as_millis()
                );
                Ok(results)
            }
            Err(e) => {
                tracker.reset();
                self.lock().fail(e.clone());
                guard.disarm();
                warn!("{} failed: {}", tool.name(), e);
                Err(e)
            }
        }
    }

    async fn run<T: Transform + ?Sized>(
        &self,
        tool: &T,
        files: &[Arc<FileDescriptor>],
    ) -> Result<Vec<Artifact>, FileKitError> {
        if tool.requires_bytes() {
            try_join_all(files.iter().map(|f| f.load())).await?;
        }
        let ctx = JobContext::new(
            Arc::clone(&self.inner.tracker),
            self.inner.config.progress_callback.clone(),
            self.inner.config.concurrency,
        );
        tool.apply(files, &ctx).await
    }

    // ── Download / reset ─────────────────────────────────────────────────

    /// Save one artifact through `target`.
    ///
    /// A transient blob handle wraps the artifact for the duration of the
    /// save and is released on every exit path. The artifact itself stays in
    /// the job's results.
    pub async fn download(
        &self,
        artifact: &Artifact,
        target: &dyn SaveTarget,
    ) -> Result<PathBuf, FileKitError> {
        let blob = self.inner.blobs.create(
            artifact.mime_type.clone(),
            artifact.byte_size,
            Some(artifact.shared_payload()),
        );
        let saved = target.save(&artifact.name, &blob).await;
        drop(blob);
        match &saved {
            Ok(path) => info!("Downloaded '{}' → {}", artifact.name, path.display()),
            Err(e) => warn!("Download of '{}' failed: {}", artifact.name, e),
        }
        saved
    }

    /// Save every result of the completed job, in order.
    pub async fn download_all(
        &self,
        target: &dyn SaveTarget,
    ) -> Result<Vec<PathBuf>, FileKitError> {
        let results = {
            let job = self.lock();
            if job.state != JobState::Completed {
                return Err(job.illegal("download results"));
            }
            job.results.clone()
        };
        let mut paths = Vec::with_capacity(results.len());
        for artifact in &results {
            paths.push(self.download(artifact, target).await?);
        }
        Ok(paths)
    }

    /// Clear files, results, progress and error; back to `Idle`.
    pub fn reset(&self) -> Result<(), FileKitError> {
        let mut job = self.lock();
        if !matches!(job.state, JobState::Completed | JobState::Failed) {
            return Err(job.illegal("reset"));
        }
        *job = Job::new();
        self.inner.tracker.reset();
        info!("Workspace reset");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Job> {
        self.inner.job.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn can_select(state: JobState) -> bool {
    matches!(
        state,
        JobState::Idle | JobState::FilesSelected | JobState::Completed
    )
}

/// Marks the job `Failed` if `process` is dropped before it settles.
struct SettleGuard<'a> {
    workspace: &'a Workspace,
    armed: bool,
}

impl<'a> SettleGuard<'a> {
    fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Job abandoned while processing");
            self.workspace.inner.tracker.reset();
            self.workspace
                .lock()
                .fail(FileKitError::Internal("job abandoned before it settled".into()));
        }
    }
}
