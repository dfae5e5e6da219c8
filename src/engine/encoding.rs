//! Base64 encode/decode for text and files.
//!
//! File encoding walks the buffer in fixed chunks and yields to the runtime
//! between them, so a large file never needs a second full-size intermediate
//! buffer and never monopolises the scheduler. The chunk length is a multiple
//! of three, which makes the concatenated chunk outputs identical to a
//! single-shot encoding (no padding in the middle of the stream).

use crate::artifact::Artifact;
use crate::error::FileKitError;
use crate::intake::FileDescriptor;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Bytes encoded per chunk: 8 KiB rounded down to a multiple of 3.
pub const BASE64_CHUNK: usize = 8 * 1024 / 3 * 3;

const TEXT_MIME: &str = "text/plain";

/// Something to Base64-encode.
#[derive(Debug, Clone, Copy)]
pub enum EncodeInput<'a> {
    /// A string, encoded as its UTF-8 bytes.
    Text(&'a str),
    /// A selected file, read lazily.
    File(&'a FileDescriptor),
}

/// Encode text or a file.
///
/// Text produces `encoded.txt`; a file produces `{name}.txt`.
pub async fn encode_base64(input: EncodeInput<'_>) -> Result<Artifact, FileKitError> {
    match input {
        EncodeInput::Text(text) => Ok(Artifact::new(
            "encoded.txt",
            TEXT_MIME,
            encode_text(text).into_bytes(),
        )),
        EncodeInput::File(file) => {
            let bytes = file.load().await?;
            let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
            for chunk in bytes.chunks(BASE64_CHUNK) {
                STANDARD.encode_string(chunk, &mut out);
                tokio::task::yield_now().await;
            }
            debug!("Encoded '{}': {} → {} bytes", file.name(), bytes.len(), out.len());
            Ok(Artifact::new(
                format!("{}.txt", file.name()),
                TEXT_MIME,
                out.into_bytes(),
            ))
        }
    }
}

/// Decode a Base64 string into `decoded.txt`.
///
/// ASCII whitespace (line wraps) is ignored; anything else outside the
/// standard alphabet, or wrong padding, is an [`FileKitError::Encoding`].
pub async fn decode_base64(encoded: &str) -> Result<Artifact, FileKitError> {
    let bytes = decode_bytes(encoded)?;
    Ok(Artifact::new("decoded.txt", mime_for(&bytes), bytes))
}

/// Decode a file holding Base64 text.
///
/// `photo.png.txt` decodes to `photo.png`; other names get a `decoded_` prefix.
pub async fn decode_file(file: &FileDescriptor) -> Result<Artifact, FileKitError> {
    let raw = file.load().await?;
    let text = std::str::from_utf8(&raw)
        .map_err(|e| FileKitError::Encoding(format!("'{}' is not text: {e}", file.name())))?;
    let bytes = decode_bytes(text)?;
    let name = match file.name().strip_suffix(".txt") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => format!("decoded_{}", file.name()),
    };
    debug!("Decoded '{}' → '{}' ({} bytes)", file.name(), name, bytes.len());
    Ok(Artifact::new(name, mime_for(&bytes), bytes))
}

/// Encode a string's UTF-8 bytes without going through a workspace.
pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode Base64 back to a string. Non-UTF-8 output is an encoding error.
pub fn decode_text(encoded: &str) -> Result<String, FileKitError> {
    String::from_utf8(decode_bytes(encoded)?)
        .map_err(|_| FileKitError::Encoding("decoded bytes are not valid UTF-8".into()))
}

fn decode_bytes(encoded: &str) -> Result<Vec<u8>, FileKitError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FileKitError::Encoding(e.to_string()))
}

fn mime_for(bytes: &[u8]) -> &'static str {
    if std::str::from_utf8(bytes).is_ok() {
        TEXT_MIME
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobRegistry;
    use crate::config::{AcceptedTypes, OverflowPolicy};
    use crate::intake::{select, IntakePolicy, RawInput};

    async fn descriptor(name: &str, bytes: Vec<u8>) -> FileDescriptor {
        let policy = IntakePolicy {
            accepted_types: AcceptedTypes::Any,
            max_files: 1,
            max_file_size: u64::MAX,
            overflow: OverflowPolicy::Truncate,
        };
        select(
            vec![RawInput::from_bytes(name, "application/octet-stream", bytes)],
            &policy,
            &BlobRegistry::new(),
        )
        .await
        .unwrap()
        .accepted
        .remove(0)
    }

    #[test]
    fn chunk_is_multiple_of_three() {
        assert_eq!(BASE64_CHUNK % 3, 0);
        assert!(BASE64_CHUNK <= 8192);
    }

    #[tokio::test]
    async fn encodes_hello() {
        let out = encode_base64(EncodeInput::Text("hello")).await.unwrap();
        assert_eq!(out.as_text(), Some("aGVsbG8="));
        assert_eq!(out.name, "encoded.txt");
        assert_eq!(out.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn malformed_input_is_encoding_error() {
        let err = decode_base64("%%%").await.unwrap_err();
        assert!(matches!(err, FileKitError::Encoding(_)));
        let err = decode_base64("aGVsbG8").await.unwrap_err();
        assert!(matches!(err, FileKitError::Encoding(_)), "missing padding");
    }

    #[test]
    fn text_mode_round_trip() {
        let encoded = encode_text("héllo wörld");
        assert_eq!(decode_text(&encoded).unwrap(), "héllo wörld");
        assert!(matches!(decode_text("/w=="), Err(FileKitError::Encoding(_))));
    }

    #[tokio::test]
    async fn decode_ignores_line_wraps() {
        let out = decode_base64("aGVs\nbG8=\n").await.unwrap();
        assert_eq!(out.as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn chunked_file_encoding_matches_single_shot() {
        let data: Vec<u8> = (0..3 * BASE64_CHUNK + 17).map(|i| (i % 251) as u8).collect();
        let file = descriptor("blob.bin", data.clone()).await;
        let out = encode_base64(EncodeInput::File(&file)).await.unwrap();
        assert_eq!(out.name, "blob.bin.txt");
        assert_eq!(out.as_text().unwrap(), STANDARD.encode(&data));

        let back = decode_base64(out.as_text().unwrap()).await.unwrap();
        assert_eq!(back.payload(), &data[..]);
        assert_eq!(back.mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn decode_file_restores_original_name() {
        let file = descriptor("photo.png.txt", b"AAEC".to_vec()).await;
        let out = decode_file(&file).await.unwrap();
        assert_eq!(out.name, "photo.png");
        assert_eq!(out.payload(), &[0u8, 1, 2][..]);

        let file = descriptor("payload.b64", b"aGk=".to_vec()).await;
        let out = decode_file(&file).await.unwrap();
        assert_eq!(out.name, "decoded_payload.b64");
        assert_eq!(out.as_text(), Some("hi"));
    }

    #[tokio::test]
    async fn empty_file_round_trips() {
        let file = descriptor("empty", Vec::new()).await;
        let out = encode_base64(EncodeInput::File(&file)).await.unwrap();
        assert_eq!(out.byte_size, 0);
        let back = decode_base64(out.as_text().unwrap()).await.unwrap();
        assert!(back.payload().is_empty());
    }
}
