//! # filekit
//!
//! Local file transformations behind a small job state machine: image
//! compression and format conversion, byte-level PDF merge/split, and Base64
//! encode/decode.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw inputs (paths / buffers)
//!  │
//!  ├─ 1. Intake    size + type filter, count limit, lazy byte handles
//!  ├─ 2. Select    Workspace: Idle → FilesSelected
//!  ├─ 3. Process   batch cap, progress 0 → ≤84 → 100, engine call
//!  │               (image work on spawn_blocking, 30 s ceiling)
//!  ├─ 4. Results   Completed with artifacts, or Failed with one error
//!  └─ 5. Download  scoped blob handle → SaveTarget, released on every path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filekit::{DirectoryTarget, RawInput, ToolOptions, Workspace, WorkspaceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ws = Workspace::new(WorkspaceConfig::builder().max_files(10).build()?);
//!     let rejected = ws.select_inputs(vec![RawInput::from_path("photo.jpg")]).await?;
//!     for r in &rejected {
//!         eprintln!("skipped {r}");
//!     }
//!
//!     let options = ToolOptions { quality: Some(0.6), ..Default::default() };
//!     let artifacts = ws.process_tool("image-compress", &options).await?;
//!     let target = DirectoryTarget::new("out");
//!     for a in &artifacts {
//!         let path = ws.download(a, &target).await?;
//!         eprintln!("{} bytes → {}", a.byte_size, path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `filekit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! filekit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod blob;
pub mod catalog;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod intake;
pub mod progress;
pub mod tool;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::Artifact;
pub use blob::{BlobHandle, BlobRegistry};
pub use catalog::{ToolCatalog, ToolDescriptor};
pub use config::{AcceptedTypes, OverflowPolicy, WorkspaceConfig, WorkspaceConfigBuilder};
pub use download::{DirectoryTarget, SaveTarget};
pub use engine::{
    compress_image, convert_image_format, decode_base64, decode_text, encode_base64, encode_text,
    merge_pdfs, split_pdf, EncodeInput, PageRange,
};
pub use error::{FileKitError, RejectReason, Rejection};
pub use intake::{select, FileDescriptor, FileSummary, IntakePolicy, RawInput, Selection};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use tool::{JobContext, ToolOptions, ToolRequest, Transform};
pub use workspace::{JobSnapshot, JobState, Workspace};
