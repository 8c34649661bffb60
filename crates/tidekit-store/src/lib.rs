//! # Tidekit Store
//!
//! Durable storage contracts for the Tidekit offline toolkit.
//!
//! The service-worker core never talks to a storage engine directly; it
//! depends on two narrow contracts defined here:
//!
//! - [`CacheStore`] / [`CacheHandle`]: named, versioned response caches
//!   (the Cache Storage role)
//! - [`RetryQueue`]: an ordered, durable queue of pending mutations
//!   (the background-sync role)
//!
//! [`MemoryCacheStore`] and [`MemoryRetryQueue`] are reference
//! implementations backed by `Arc<RwLock<…>>`. They are what the tests run
//! against and what a host without a durable backend can start with; both
//! are safe to clone across concurrent tasks.

use thiserror::Error;

pub mod cache;
pub mod queue;

pub use cache::{CacheHandle, CacheStore, MemoryCacheHandle, MemoryCacheStore, StoredResponse};
pub use queue::{EntryId, MemoryRetryQueue, QueueEntry, RetryQueue};

/// Errors surfaced by storage backends.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Storage IO error: {0}")]
    Io(String),
}
