//! Transformation engine: one stateless async operation per tool.
//!
//! Each submodule implements one family of tools. No operation touches
//! shared mutable state, so independent calls may run concurrently.
//!
//! ## Operations
//!
//! ```text
//! raster    compress_image, convert_image_format   (decode → re-encode)
//! pdf       merge_pdfs, split_pdf                   (raw byte moves)
//! encoding  encode_base64, decode_base64            (chunked Base64)
//! ```
//!
//! CPU-heavy image work runs on the blocking pool and is bounded by
//! [`crate::config::IMAGE_CEILING`]; everything else suspends only at byte
//! reads and chunk boundaries.

pub mod encoding;
pub mod raster;
pub mod pdf;

pub use self::encoding::{
    decode_base64, decode_file, decode_text, encode_base64, encode_text, EncodeInput, BASE64_CHUNK,
};
pub use self::raster::{compress_image, convert_image_format, ImageTarget};
pub use self::pdf::{merge_pdfs, split_pdf, PageRange};

use crate::error::FileKitError;
use std::future::Future;
use std::time::Duration;

/// Run `fut`, failing with [`FileKitError::Timeout`] once `ceiling` elapses.
pub async fn with_ceiling<T, F>(
    operation: &str,
    ceiling: Duration,
    fut: F,
) -> Result<T, FileKitError>
where
    F: Future<Output = Result<T, FileKitError>>,
{
    tokio::time::timeout(ceiling, fut)
        .await
        .map_err(|_| FileKitError::Timeout {
            operation: operation.to_string(),
            secs: ceiling.as_secs(),
        })?
}

/// Run CPU-bound work on the blocking pool under a time ceiling.
pub(crate) async fn run_blocking<T, F>(
    operation: &str,
    ceiling: Duration,
    work: F,
) -> Result<T, FileKitError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FileKitError> + Send + 'static,
{
    with_ceiling(operation, ceiling, async {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| FileKitError::Internal(format!("{operation} task panicked: {e}")))?
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ceiling_turns_slow_work_into_timeout() {
        let err = with_ceiling("slow op", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, FileKitError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            FileKitError::Timeout { ref operation, .. } if operation == "slow op"
        ));
    }

    #[tokio::test]
    async fn blocking_work_result_is_returned() {
        let v = run_blocking("sum", Duration::from_secs(5), || Ok(2 + 2))
            .await
            .unwrap();
        assert_eq!(v, 4);
    }

    #[tokio::test]
    async fn blocking_errors_propagate() {
        let err = run_blocking::<(), _>("fail", Duration::from_secs(5), || {
            Err(FileKitError::Internal("boom".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, FileKitError::Internal("boom".into()));
    }
}
