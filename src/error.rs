//! Error types for the filekit library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FileKitError`] — **Fatal**: the job cannot produce a result at all
//!   (batch over its byte cap, undecodable image, malformed Base64, an
//!   operation called in the wrong workspace state). A failed job surfaces
//!   exactly one of these and never exposes partial artifacts.
//!
//! * [`Rejection`] — **Non-fatal**: a single file was refused during intake
//!   (too large, wrong type, over the count limit) while the rest of the
//!   selection proceeds. Returned alongside the accepted descriptors so the
//!   caller can decide whether to tell the user.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All fatal errors returned by the filekit library.
///
/// The type is `Clone` so a failed job can keep the same value it handed back
/// to the caller; I/O failures are therefore captured as strings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FileKitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Bad input: empty selection, out-of-range option, zero split ranges, …
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A file could not be read from its source.
    #[error("Failed to read '{name}': {detail}")]
    ReadFailed { name: String, detail: String },

    /// A batch or merge exceeded its aggregate byte cap.
    #[error("Combined size {total} bytes exceeds the {limit} byte limit")]
    AggregateLimit { total: u64, limit: u64 },

    // ── Image pipeline errors ─────────────────────────────────────────────
    /// The input bytes are not a decodable image.
    #[error("Failed to decode image '{name}': {detail}")]
    Decode { name: String, detail: String },

    /// Re-encoding at the source format failed.
    #[error("Compression failed for '{name}': {detail}")]
    Compression { name: String, detail: String },

    /// Re-encoding to the requested target format failed or is unsupported.
    #[error("Conversion of '{name}' failed: {detail}")]
    Conversion { name: String, detail: String },

    /// An operation ran past its time ceiling.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // ── Encoding errors ───────────────────────────────────────────────────
    /// Malformed Base64 alphabet/padding, or unencodable bytes.
    #[error("Base64 error: {0}")]
    Encoding(String),

    // ── Catalog errors ────────────────────────────────────────────────────
    #[error("Tool '{id}' not found")]
    NotFound { id: String },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// The workspace state machine does not allow this operation right now.
    #[error("Cannot {operation} while the workspace is {state}")]
    IllegalState {
        operation: &'static str,
        state: String,
    },

    /// The download target refused or failed to write the artifact.
    #[error("Failed to save '{name}': {detail}")]
    SaveFailed { name: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FileKitError {
    /// Short stable label for the error family, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            FileKitError::Validation(_) => "validation",
            FileKitError::ReadFailed { .. } => "read",
            FileKitError::AggregateLimit { .. } => "aggregate_limit",
            FileKitError::Decode { .. } => "decode",
            FileKitError::Compression { .. } => "compression",
            FileKitError::Conversion { .. } => "conversion",
            FileKitError::Timeout { .. } => "timeout",
            FileKitError::Encoding(_) => "encoding",
            FileKitError::NotFound { .. } => "not_found",
            FileKitError::IllegalState { .. } => "illegal_state",
            FileKitError::SaveFailed { .. } => "save",
            FileKitError::Internal(_) => "internal",
        }
    }
}

/// Why a single file was refused during intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The file is larger than the per-file cap.
    TooLarge { size: u64, max: u64 },
    /// Neither the MIME type nor the extension matched the accepted types.
    TypeNotAccepted { mime_type: String },
    /// The file was past the `max_files` cut-off (only reported under
    /// [`crate::config::OverflowPolicy::Report`]).
    OverLimit { max_files: usize },
}

/// A non-fatal, per-file intake failure.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {}", describe(.reason))]
pub struct Rejection {
    pub name: String,
    pub reason: RejectReason,
}

fn describe(reason: &RejectReason) -> String {
    match reason {
        RejectReason::TooLarge { size, max } => {
            format!("{size} bytes exceeds the {max} byte per-file limit")
        }
        RejectReason::TypeNotAccepted { mime_type } => {
            format!("type '{mime_type}' is not accepted")
        }
        RejectReason::OverLimit { max_files } => {
            format!("only the first {max_files} files are kept")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_limit_display() {
        let e = FileKitError::AggregateLimit {
            total: 55,
            limit: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("55"), "got: {msg}");
        assert!(msg.contains("50"), "got: {msg}");
        assert_eq!(e.kind(), "aggregate_limit");
    }

    #[test]
    fn illegal_state_display() {
        let e = FileKitError::IllegalState {
            operation: "process",
            state: "processing".into(),
        };
        assert_eq!(
            e.to_string(),
            "Cannot process while the workspace is processing"
        );
    }

    #[test]
    fn timeout_display() {
        let e = FileKitError::Timeout {
            operation: "image decode".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn rejection_display() {
        let r = Rejection {
            name: "big.png".into(),
            reason: RejectReason::TooLarge { size: 20, max: 10 },
        };
        let msg = r.to_string();
        assert!(msg.starts_with("big.png:"), "got: {msg}");
        assert!(msg.contains("20 bytes"));
    }

    #[test]
    fn rejection_serialises_with_kind_tag() {
        let r = Rejection {
            name: "a.txt".into(),
            reason: RejectReason::TypeNotAccepted {
                mime_type: "text/plain".into(),
            },
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains(r#""kind":"type_not_accepted""#), "got: {json}");
    }
}
