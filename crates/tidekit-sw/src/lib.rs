//! # Tidekit Service Worker
//!
//! Offline-first request interception for a browser-hosted application:
//! per-request cache-or-network decisions, a versioned cache lifecycle,
//! and durable replay of writes that failed while offline.
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher (handle / on_message)
//!     │
//!     ├── Router ──────────── RouteClass
//!     │
//!     ├── StrategyEngine ──── CacheStore │ Fetcher
//!     │
//!     └── SyncQueueManager ── RetryQueue │ Fetcher
//!
//! LifecycleController (on_install / on_activate)
//!     └── PrecacheManager ── CacheStore │ Fetcher
//! ```
//!
//! The lifecycle side runs at startup and version changes; only the
//! dispatcher side sits in the per-request path. Storage and transport are
//! external collaborators behind the `tidekit-store` traits and
//! [`fetch::Fetcher`].

use std::time::Duration;

use thiserror::Error;

use tidekit_store::StoreError;

pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod lifecycle;
pub mod precache;
pub mod routes;
pub mod strategy;
pub mod sync;

#[cfg(test)]
mod support;

pub use config::{CacheConfig, CachePurpose, StrategyConfig};
pub use dispatch::{Dispatcher, Message};
pub use fetch::{Destination, FetchError, Fetcher, Request, Response, ResponseSource};
pub use lifecycle::{CleanupReport, LifecycleController, LifecycleState};
pub use precache::{PrecacheEntry, PrecacheManager, SeedReport};
pub use routes::{RouteClass, Router};
pub use strategy::{CacheFallback, StrategyEngine};
pub use sync::{ReplayReport, RequestSnapshot, SyncConfig, SyncQueueManager};

/// Errors surfaced by the service-worker core.
#[derive(Error, Debug)]
pub enum SwError {
    /// Network unreachable or non-success status.
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    /// The network race lost to the clock.
    #[error("Network timed out after {0:?}")]
    Timeout(Duration),

    /// Cache-first miss plus network failure; unrecoverable for this
    /// request.
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Network-first exhausted every fallback tier.
    #[error("Network and cache exhausted for {0}")]
    NetworkAndCacheExhausted(String),

    /// Sync queue insertion rejected: the snapshot is already older than
    /// the retention ceiling.
    #[error("Retention ceiling already exceeded")]
    RetentionExceeded,

    /// Lifecycle transition not permitted by the state machine.
    #[error("Invalid lifecycle transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: lifecycle::LifecycleState,
        to: lifecycle::LifecycleState,
    },

    /// Storage backend failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A queued request snapshot could not be encoded or decoded.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<FetchError> for SwError {
    fn from(err: FetchError) -> Self {
        SwError::FetchFailure(err.to_string())
    }
}
