//! Durable FIFO retry queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::StoreError;

/// Identity of a queued entry. Removal is keyed by id so a replay pass that
/// resumes after a restart never removes the wrong entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

/// One queued mutation, as the store sees it. The payload is opaque here;
/// the service-worker core serializes its request snapshot into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry identity.
    pub id: EntryId,

    /// Enqueue timestamp (ms since epoch), used for retention eviction.
    pub enqueued_at_ms: u64,

    /// Serialized request snapshot.
    pub payload: Vec<u8>,
}

/// An ordered, durable queue of pending mutations.
///
/// Append order is replay order; implementations must preserve FIFO across
/// restarts.
#[allow(async_fn_in_trait)]
pub trait RetryQueue: Clone + Send + Sync {
    /// Append an entry. Returns its identity.
    async fn append(&self, payload: Vec<u8>, enqueued_at_ms: u64) -> Result<EntryId, StoreError>;

    /// Remove and return the oldest entry, if any.
    async fn pop_front(&self) -> Result<Option<QueueEntry>, StoreError>;

    /// All entries in FIFO order, oldest first.
    async fn peek_all(&self) -> Result<Vec<QueueEntry>, StoreError>;

    /// Remove an entry by id. Returns whether it was present.
    async fn remove(&self, id: EntryId) -> Result<bool, StoreError>;
}

/// In-memory retry queue.
#[derive(Clone, Default)]
pub struct MemoryRetryQueue {
    entries: Arc<RwLock<VecDeque<QueueEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryRetryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryQueue for MemoryRetryQueue {
    async fn append(&self, payload: Vec<u8>, enqueued_at_ms: u64) -> Result<EntryId, StoreError> {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().await.push_back(QueueEntry {
            id,
            enqueued_at_ms,
            payload,
        });
        Ok(id)
    }

    async fn pop_front(&self) -> Result<Option<QueueEntry>, StoreError> {
        Ok(self.entries.write().await.pop_front())
    }

    async fn peek_all(&self) -> Result<Vec<QueueEntry>, StoreError> {
        Ok(self.entries.read().await.iter().cloned().collect())
    }

    async fn remove(&self, id: EntryId) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.iter().position(|e| e.id == id) {
            Some(index) => {
                entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
