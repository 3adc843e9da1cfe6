//! Blob storage for uploaded documents and listing images.
//!
//! Stores hand back public URLs; the database only ever holds those URLs.

pub mod local;

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

pub use local::LocalBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key '{0}'")]
    InvalidKey(String),

    #[error("blob '{0}' not found")]
    NotFound(String),

    #[error("url '{0}' is not served by this blob store")]
    ForeignUrl(String),

    #[error("blob io failure on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, returning the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError>;
    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, BlobError>;
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
    /// Inverse of the URL returned by `put`.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Delete the blob behind `url` without letting a failure escape as an error
/// of the calling operation. The outcome is logged and returned for callers
/// that want to inspect it.
pub async fn release(store: &dyn BlobStore, url: &str) -> Result<(), BlobError> {
    let result = match store.key_for_url(url) {
        Some(key) => store.delete(&key).await,
        None => Err(BlobError::ForeignUrl(url.to_string())),
    };
    match &result {
        Ok(()) => debug!(url, "released blob"),
        Err(err) => warn!(url, error = %err, "best-effort blob deletion failed"),
    }
    result
}

/// Maps keys to URLs under a fixed public prefix.
#[derive(Debug, Clone)]
pub(crate) struct PublicUrls {
    base: String,
}

impl PublicUrls {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base, key)
    }

    pub(crate) fn key(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| validate_key(key).is_ok())
            .map(str::to_string)
    }
}

/// Keys are relative slash-separated paths without `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(BlobError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Blob store kept in process memory, with switches for failure injection.
#[derive(Debug)]
pub struct InMemoryBlobStore {
    urls: PublicUrls,
    blobs: RwLock<HashMap<String, StoredBlob>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new(public_base: &str) -> Self {
        Self {
            urls: PublicUrls::new(public_base),
            blobs: RwLock::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains_url(&self, url: &str) -> bool {
        let Some(key) = self.urls.key(url) else {
            return false;
        };
        self.blobs
            .read()
            .map(|blobs| blobs.contains_key(&key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError> {
        validate_key(key)?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("put rejected".into()));
        }
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| BlobError::Unavailable("lock poisoned".into()))?;
        blobs.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.urls.url(key))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, BlobError> {
        validate_key(key)?;
        let blobs = self
            .blobs
            .read()
            .map_err(|_| BlobError::Unavailable("lock poisoned".into()))?;
        Ok(blobs.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("delete rejected".into()));
        }
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| BlobError::Unavailable("lock poisoned".into()))?;
        blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        self.urls.key(url)
    }
}
