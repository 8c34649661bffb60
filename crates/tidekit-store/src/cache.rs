//! Named response caches.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::StoreError;

/// An opaque cached response blob, keyed by normalized request URL within a
/// named cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Content revision, set only for precached entries.
    pub revision: Option<String>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at_ms: u64,
}

impl StoredResponse {
    /// Create a response blob with the given status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>, stored_at_ms: u64) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
            revision: None,
            stored_at_ms,
        }
    }

    /// Attach a precache revision.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// A collection of named caches.
///
/// `open` creates the cache when it does not exist yet, mirroring the
/// browser Cache Storage contract.
#[allow(async_fn_in_trait)]
pub trait CacheStore: Clone + Send + Sync {
    type Handle: CacheHandle;

    /// Open a cache by name, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Handle, StoreError>;

    /// Names of all existing caches.
    async fn cache_names(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a whole cache. Returns whether it existed.
    async fn delete_cache(&self, name: &str) -> Result<bool, StoreError>;
}

/// A single named cache.
#[allow(async_fn_in_trait)]
pub trait CacheHandle: Send + Sync {
    /// Look up an entry by key.
    async fn get(&self, key: &str) -> Result<Option<StoredResponse>, StoreError>;

    /// Store an entry under a key. Last write wins.
    async fn put(&self, key: &str, response: StoredResponse) -> Result<(), StoreError>;

    /// Delete an entry. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

type Entries = Arc<RwLock<HashMap<String, StoredResponse>>>;

/// In-memory cache store.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    caches: Arc<RwLock<HashMap<String, Entries>>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    type Handle = MemoryCacheHandle;

    async fn open(&self, name: &str) -> Result<Self::Handle, StoreError> {
        let mut caches = self.caches.write().await;
        let entries = caches.entry(name.to_string()).or_default().clone();
        Ok(MemoryCacheHandle { entries })
    }

    async fn cache_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete_cache(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }
}

/// Handle onto one in-memory cache.
pub struct MemoryCacheHandle {
    entries: Entries,
}

impl CacheHandle for MemoryCacheHandle {
    async fn get(&self, key: &str) -> Result<Option<StoredResponse>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: StoredResponse) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
