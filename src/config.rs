//! Configuration types for a filekit workspace.
//!
//! All workspace behaviour is controlled through [`WorkspaceConfig`], built
//! via its [`WorkspaceConfigBuilder`]. The engine's own ceilings (image edge
//! cap, decode timeout, merge cap) are fixed constants exported from this
//! module so callers can display them.

use crate::error::FileKitError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Longest image edge the compressor keeps; larger images are downscaled.
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// Per-operation ceiling for image decode + encode.
pub const IMAGE_CEILING: Duration = Duration::from_secs(30);

/// Combined byte cap for a PDF merge.
pub const MERGE_LIMIT: u64 = 50 * MIB;

/// Fixed quality used by format conversion.
pub const CONVERT_QUALITY: f32 = 0.9;

/// Compression quality when the caller does not specify one.
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Configuration for a [`crate::workspace::Workspace`].
///
/// # Example
/// ```rust
/// use filekit::{AcceptedTypes, WorkspaceConfig};
///
/// let config = WorkspaceConfig::builder()
///     .accepted_types(AcceptedTypes::parse("image/*"))
///     .max_files(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_files, 10);
/// ```
#[derive(Clone)]
pub struct WorkspaceConfig {
    /// Type filter applied at intake. Default: wildcard.
    pub accepted_types: AcceptedTypes,

    /// Maximum number of accepted files per selection. Default: 1.
    pub max_files: usize,

    /// Per-file byte cap. Default: 10 MiB.
    pub max_file_size: u64,

    /// Byte cap for the whole batch, checked when processing starts. Default: 100 MiB.
    pub max_batch_size: u64,

    /// What happens to files past `max_files`. Default: [`OverflowPolicy::Truncate`].
    pub overflow: OverflowPolicy,

    /// Tick of the heuristic progress estimator. Default: 150 ms.
    pub progress_interval: Duration,

    /// Pause between reaching 100 % and publishing results. Default: 300 ms.
    pub settle_delay: Duration,

    /// Files transformed concurrently within one job. Default: 4.
    ///
    /// Results are always returned in input order regardless of this value.
    pub concurrency: usize,

    /// Optional per-file event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            accepted_types: AcceptedTypes::Any,
            max_files: 1,
            max_file_size: 10 * MIB,
            max_batch_size: 100 * MIB,
            overflow: OverflowPolicy::default(),
            progress_interval: Duration::from_millis(150),
            settle_delay: Duration::from_millis(300),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("accepted_types", &self.accepted_types)
            .field("max_files", &self.max_files)
            .field("max_file_size", &self.max_file_size)
            .field("max_batch_size", &self.max_batch_size)
            .field("overflow", &self.overflow)
            .field("progress_interval", &self.progress_interval)
            .field("settle_delay", &self.settle_delay)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ProcessingProgressCallback>"),
            )
            .finish()
    }
}

impl WorkspaceConfig {
    /// Create a new builder for `WorkspaceConfig`.
    pub fn builder() -> WorkspaceConfigBuilder {
        WorkspaceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WorkspaceConfig`].
#[derive(Debug)]
pub struct WorkspaceConfigBuilder {
    config: WorkspaceConfig,
}

impl WorkspaceConfigBuilder {
    pub fn accepted_types(mut self, types: AcceptedTypes) -> Self {
        self.config.accepted_types = types;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_batch_size(mut self, bytes: u64) -> Self {
        self.config.max_batch_size = bytes;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkspaceConfig, FileKitError> {
        let c = &self.config;
        if c.max_files == 0 {
            return Err(FileKitError::Validation("max_files must be ≥ 1".into()));
        }
        if c.max_file_size == 0 || c.max_batch_size == 0 {
            return Err(FileKitError::Validation(
                "size limits must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Type filter for intake: either everything, or a list of tokens.
///
/// Tokens are MIME types (`image/png`), MIME families (`image/*`) or
/// extensions (`.pdf`, `pdf`). Matching rules live in
/// [`crate::intake::type_accepted`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptedTypes {
    /// Accept every file (default).
    #[default]
    Any,
    /// Accept files matching at least one token (lower-cased, trimmed).
    Tokens(Vec<String>),
}

impl AcceptedTypes {
    /// Parse an HTML-style accept string: `"*"` or a comma separated list.
    pub fn parse(filter: &str) -> Self {
        let filter = filter.trim();
        if filter.is_empty() || filter == "*" {
            return AcceptedTypes::Any;
        }
        let tokens: Vec<String> = filter
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            AcceptedTypes::Any
        } else {
            AcceptedTypes::Tokens(tokens)
        }
    }
}

/// What intake does with accepted files beyond `max_files`.
///
/// `Truncate` keeps the historical behaviour of silently dropping the excess;
/// `Report` returns each dropped file as an [`crate::error::RejectReason::OverLimit`]
/// rejection. Both keep the first `max_files` files in selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    #[default]
    Truncate,
    Report,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let c = WorkspaceConfig::default();
        assert_eq!(c.max_files, 1);
        assert_eq!(c.max_file_size, 10 * MIB);
        assert_eq!(c.max_batch_size, 100 * MIB);
        assert_eq!(c.accepted_types, AcceptedTypes::Any);
        assert_eq!(c.overflow, OverflowPolicy::Truncate);
    }

    #[test]
    fn builder_rejects_zero_files() {
        let err = WorkspaceConfig::builder().max_files(0).build().unwrap_err();
        assert!(matches!(err, FileKitError::Validation(_)));
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = WorkspaceConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn parse_accept_string() {
        assert_eq!(AcceptedTypes::parse("*"), AcceptedTypes::Any);
        assert_eq!(AcceptedTypes::parse("  "), AcceptedTypes::Any);
        assert_eq!(
            AcceptedTypes::parse("image/*, .PDF"),
            AcceptedTypes::Tokens(vec!["image/*".into(), ".pdf".into()])
        );
    }
}
