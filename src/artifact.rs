//! Output artifacts produced by the transformation engine.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// An immutable output file.
///
/// `byte_size` is the size the engine reports for the artifact. It equals
/// `payload.len()` for every tool except the split placeholder, which reports
/// an even share of the source size while carrying the full source bytes.
#[derive(Clone, Serialize)]
pub struct Artifact {
    pub name: String,
    pub byte_size: u64,
    pub mime_type: String,
    #[serde(skip)]
    payload: Arc<[u8]>,
}

impl Artifact {
    /// Build an artifact whose reported size is its payload length.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: impl Into<Arc<[u8]>>,
    ) -> Self {
        let payload = payload.into();
        Self {
            name: name.into(),
            byte_size: payload.len() as u64,
            mime_type: mime_type.into(),
            payload,
        }
    }

    /// Build an artifact with an explicitly reported size.
    pub(crate) fn with_reported_size(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: Arc<[u8]>,
        byte_size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            byte_size,
            mime_type: mime_type.into(),
            payload,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Shared handle to the payload, used when a download blob is created.
    pub fn shared_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("name", &self.name)
            .field("byte_size", &self.byte_size)
            .field("mime_type", &self.mime_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_follows_payload() {
        let a = Artifact::new("out.txt", "text/plain", b"hello".to_vec());
        assert_eq!(a.byte_size, 5);
        assert_eq!(a.as_text(), Some("hello"));
    }

    #[test]
    fn json_omits_payload() {
        let a = Artifact::new("out.bin", "application/octet-stream", vec![1u8, 2, 3]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(
            json,
            r#"{"name":"out.bin","byte_size":3,"mime_type":"application/octet-stream"}"#
        );
    }
}
