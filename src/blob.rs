//! Transient blob handles: image previews and download blobs.
//!
//! A [`BlobHandle`] is the workspace's equivalent of an object URL. It is
//! registered in a shared [`BlobRegistry`] when created and unregistered when
//! dropped, so every exit path (normal return, `?` early-return, panic
//! unwinding) releases it. [`BlobRegistry::live`] lets tests and callers
//! check that nothing leaked after a download or a reset.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct BlobEntry {
    mime_type: String,
    byte_size: u64,
}

/// Shared table of live blob handles. Cheap to clone.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    entries: Arc<Mutex<HashMap<String, BlobEntry>>>,
}

impl fmt::Debug for BlobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRegistry")
            .field("live", &self.live())
            .finish()
    }
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new blob and return its scoped handle.
    ///
    /// `payload` is `None` for previews, whose bytes stay behind the source
    /// handle, and `Some` for download blobs.
    pub fn create(
        &self,
        mime_type: impl Into<String>,
        byte_size: u64,
        payload: Option<Arc<[u8]>>,
    ) -> BlobHandle {
        let url = format!("blob:filekit/{}", Uuid::new_v4());
        let entry = BlobEntry {
            mime_type: mime_type.into(),
            byte_size,
        };
        self.lock().insert(url.clone(), entry);
        debug!("Acquired {}", url);
        BlobHandle {
            url,
            payload,
            registry: self.clone(),
        }
    }

    /// Number of handles currently alive.
    pub fn live(&self) -> usize {
        self.lock().len()
    }

    /// Whether `url` still refers to a live handle.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }

    /// MIME type and size recorded for a live handle.
    pub fn describe(&self, url: &str) -> Option<(String, u64)> {
        self.lock()
            .get(url)
            .map(|e| (e.mime_type.clone(), e.byte_size))
    }

    fn release(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            debug!("Released {}", url);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BlobEntry>> {
        // A poisoned table still holds consistent entries; keep using it.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A live blob reference; released when dropped.
pub struct BlobHandle {
    url: String,
    payload: Option<Arc<[u8]>>,
    registry: BlobRegistry,
}

impl BlobHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bytes behind a download blob; empty for previews.
    pub fn bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("url", &self.url)
            .field("bytes", &self.payload.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.registry.release(&self.url);
    }
}
