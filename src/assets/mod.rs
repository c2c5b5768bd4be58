//! Local document cache: a small key→blob contract over pluggable backends,
//! with get-or-fetch-and-store semantics for documents that live at a remote
//! source.
//!
//! The durable backend is SQLite (see [`crate::db::Database`]); an in-memory
//! map backs session-only copies when a durable write fails, and doubles as
//! the test store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid asset: {0}")]
    Invalid(&'static str),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("content unavailable for '{key}': {reason}")]
    Content { key: String, reason: String },
}

/// A stored payload together with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Minimal key→blob contract. Writes must be atomic per key; concurrent
/// writes to different keys must not block each other. Implementations exist
/// for the SQLite database and for a plain in-memory map.
pub trait BlobStore: Send + Sync {
    fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>, StoreError>;
    fn put_blob(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn delete_blob(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        (**self).get_blob(key)
    }

    fn put_blob(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put_blob(key, filename, bytes)
    }

    fn delete_blob(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete_blob(key)
    }
}

/// Remote origin for a document, addressed by a locator string.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, String>;
}

/// HTTP(S) origin.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetSource for HttpSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, String> {
        let resp = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// In-memory store: session-fallback backend and test double.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    fn put_blob(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.lock().unwrap().insert(
            key.to_string(),
            StoredBlob {
                filename: filename.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_blob(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Cache over a durable [`BlobStore`]. When the durable write fails, the
/// payload is kept in a session-only overlay so the document stays usable
/// until the process exits.
pub struct AssetCache<S> {
    store: S,
    overlay: MemoryStore,
}

impl<S: BlobStore> AssetCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            overlay: MemoryStore::new(),
        }
    }

    /// Upsert the record for `key`, replacing filename and payload.
    pub fn put(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::Invalid("empty key"));
        }
        if bytes.is_empty() {
            return Err(StoreError::Invalid("empty payload"));
        }
        self.store.put_blob(key, filename, bytes)?;
        // A successful durable write supersedes any session-only copy.
        let _ = self.overlay.delete_blob(key);
        Ok(())
    }

    /// Stored payload for `key`, or `None`. Does not fetch remotely.
    pub fn get(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        if let Some(blob) = self.store.get_blob(key)? {
            return Ok(Some(blob));
        }
        self.overlay.get_blob(key)
    }

    /// Idempotent removal.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _ = self.overlay.delete_blob(key);
        self.store.delete_blob(key)
    }

    /// Get-or-fetch-and-store: cache hit wins; on miss the remote source is
    /// fetched and the payload cached before returning. A failed fetch
    /// propagates with no write. A failed write degrades to a session-only
    /// copy.
    pub async fn load_or_fetch(
        &self,
        key: &str,
        filename: &str,
        locator: &str,
        source: &dyn AssetSource,
    ) -> Result<StoredBlob, AssetError> {
        match self.store.get_blob(key) {
            Ok(Some(blob)) => {
                tracing::debug!(key, "cache hit");
                return Ok(blob);
            }
            Ok(None) => {}
            // Absence due to a store error is still a miss, but worth telling apart.
            Err(e) => tracing::warn!(key, error = %e, "cache read failed, treating as miss"),
        }
        if let Ok(Some(blob)) = self.overlay.get_blob(key) {
            tracing::debug!(key, "session-only copy hit");
            return Ok(blob);
        }

        tracing::info!(key, locator, "cache miss, fetching");
        let bytes = source.fetch(locator).await.map_err(|reason| AssetError::Content {
            key: key.to_string(),
            reason,
        })?;
        if bytes.is_empty() {
            return Err(AssetError::Content {
                key: key.to_string(),
                reason: "empty response body".into(),
            });
        }

        if let Err(e) = self.put(key, filename, &bytes) {
            tracing::warn!(key, error = %e, "cache write failed, keeping session-only copy");
            let _ = self.overlay.put_blob(key, filename, &bytes);
        }
        Ok(StoredBlob {
            filename: filename.to_string(),
            bytes,
        })
    }
}
