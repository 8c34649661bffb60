//! Background sync: durable capture and replay of failed mutating requests.
//!
//! Failed POSTs are snapshotted into the retry queue and re-issued in FIFO
//! order when the host signals reconnect. Replay stops at the first failure
//! so dependent writes are never applied out of order, and entries older
//! than the retention ceiling are evicted instead of replayed.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use tidekit_common::{now_ms, with_timeout};
use tidekit_store::{EntryId, RetryQueue};

use crate::fetch::{Destination, Fetcher, Request};
use crate::SwError;

/// Sync queue configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Queue name, used in log output.
    pub name: String,
    /// Retention ceiling: entries older than this are dropped, not replayed.
    pub retention: Duration,
    /// Deadline for each replayed fetch.
    pub replay_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            name: "sync-tasks".to_string(),
            retention: Duration::from_secs(24 * 60 * 60),
            replay_timeout: Duration::from_secs(3),
        }
    }
}

/// Durable form of a failed mutating request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
    /// Capture timestamp (ms since epoch).
    pub captured_at_ms: u64,
}

impl RequestSnapshot {
    /// Snapshot a request at the given instant.
    pub fn capture(request: &Request, captured_at_ms: u64) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            captured_at_ms,
        }
    }

    /// Rebuild a request for replay.
    pub fn to_request(&self) -> Result<Request, SwError> {
        let url = Url::parse(&self.url)
            .map_err(|e| SwError::Snapshot(format!("bad snapshot url {}: {e}", self.url)))?;
        Ok(Request {
            method: self.method.clone(),
            url,
            destination: Destination::Other,
            headers: self.headers.clone(),
            body: self.body.clone(),
        })
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries dropped for exceeding the retention ceiling.
    pub evicted: usize,
    /// Entries re-issued successfully and removed.
    pub replayed: usize,
    /// Entries still queued after the pass.
    pub remaining: usize,
}

/// Captures failed mutations and replays them on reconnect.
pub struct SyncQueueManager<Q: RetryQueue, F: Fetcher> {
    queue: Q,
    fetcher: Arc<F>,
    config: SyncConfig,
    // Serializes replay passes; two passes over the same queue would race
    // each other's removals.
    replay_gate: Mutex<()>,
}

impl<Q: RetryQueue, F: Fetcher> SyncQueueManager<Q, F> {
    /// Create a manager.
    pub fn new(queue: Q, fetcher: Arc<F>, config: SyncConfig) -> Self {
        Self {
            queue,
            fetcher,
            config,
            replay_gate: Mutex::new(()),
        }
    }

    /// The underlying queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Append a failed request for later replay.
    ///
    /// A snapshot whose age already exceeds the retention ceiling is
    /// rejected instead of queued dead.
    pub async fn enqueue(&self, snapshot: RequestSnapshot) -> Result<EntryId, SwError> {
        let now = now_ms();
        if self.expired(snapshot.captured_at_ms, now) {
            return Err(SwError::RetentionExceeded);
        }

        let payload = serde_json::to_vec(&snapshot)
            .map_err(|e| SwError::Snapshot(format!("serialize: {e}")))?;
        let id = self.queue.append(payload, now).await?;

        debug!(?id, url = %snapshot.url, "queued mutating request for retry");
        Ok(id)
    }

    /// Drop entries older than the retention ceiling. Returns how many
    /// were dropped.
    pub async fn evict_expired(&self) -> Result<usize, SwError> {
        let now = now_ms();
        let mut evicted = 0;

        for entry in self.queue.peek_all().await? {
            if self.expired(entry.enqueued_at_ms, now) && self.queue.remove(entry.id).await? {
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(evicted, "dropped expired sync entries");
        }
        Ok(evicted)
    }

    /// Replay queued entries in FIFO order.
    ///
    /// Runs at most one pass at a time per manager. Each success removes
    /// its entry; the first failure stops the pass, leaving the remainder
    /// queued in order for the next reconnect.
    pub async fn replay(&self) -> Result<ReplayReport, SwError> {
        let _gate = self.replay_gate.lock().await;

        let mut report = ReplayReport {
            evicted: self.evict_expired().await?,
            ..Default::default()
        };

        for entry in self.queue.peek_all().await? {
            let snapshot: RequestSnapshot = match serde_json::from_slice(&entry.payload) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    // An undecodable entry would wedge the queue forever;
                    // drop it rather than stall every future pass.
                    warn!(id = ?entry.id, error = %err, "dropping undecodable sync entry");
                    self.queue.remove(entry.id).await?;
                    report.evicted += 1;
                    continue;
                }
            };

            let request = snapshot.to_request()?;
            let outcome = with_timeout(self.config.replay_timeout, self.fetcher.fetch(&request)).await;

            match outcome {
                Ok(Ok(_)) => {
                    self.queue.remove(entry.id).await?;
                    report.replayed += 1;
                    debug!(id = ?entry.id, url = %snapshot.url, "replayed queued request");
                }
                Ok(Err(err)) => {
                    debug!(id = ?entry.id, error = %err, "replay failed, stopping pass");
                    break;
                }
                Err(_) => {
                    debug!(id = ?entry.id, "replay timed out, stopping pass");
                    break;
                }
            }
        }

        report.remaining = self.queue.peek_all().await?.len();
        info!(
            queue = %self.config.name,
            evicted = report.evicted,
            replayed = report.replayed,
            remaining = report.remaining,
            "sync replay pass complete"
        );
        Ok(report)
    }

    /// Host reconnect signal.
    pub async fn on_reconnect(&self) -> Result<ReplayReport, SwError> {
        self.replay().await
    }

    fn expired(&self, at_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(at_ms) >= self.config.retention.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::MockFetcher;
    use tidekit_store::MemoryRetryQueue;

    fn manager(fetcher: MockFetcher) -> SyncQueueManager<MemoryRetryQueue, MockFetcher> {
        SyncQueueManager::new(
            MemoryRetryQueue::new(),
            Arc::new(fetcher),
            SyncConfig::default(),
        )
    }

    fn snapshot(path: &str) -> RequestSnapshot {
        let url = Url::parse(&format!("https://app.example{path}")).unwrap();
        RequestSnapshot::capture(&Request::post(url, b"{}".to_vec()), now_ms())
    }

    fn expired_payload(path: &str) -> Vec<u8> {
        let mut old = snapshot(path);
        old.captured_at_ms = 0;
        serde_json::to_vec(&old).unwrap()
    }

    #[tokio::test]
    async fn test_replay_preserves_fifo_order() {
        let manager = manager(MockFetcher::online());
        manager.enqueue(snapshot("/api/a")).await.unwrap();
        manager.enqueue(snapshot("/api/b")).await.unwrap();
        manager.enqueue(snapshot("/api/c")).await.unwrap();

        let report = manager.on_reconnect().await.unwrap();
        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);

        assert_eq!(
            manager.fetcher.fetched_keys(),
            vec!["/api/a", "/api/b", "/api/c"]
        );
    }

    #[tokio::test]
    async fn test_partial_replay_stops_at_first_failure() {
        let fetcher = MockFetcher::online();
        fetcher.fail("/api/b");
        let manager = manager(fetcher);

        manager.enqueue(snapshot("/api/a")).await.unwrap();
        manager.enqueue(snapshot("/api/b")).await.unwrap();
        manager.enqueue(snapshot("/api/c")).await.unwrap();

        let report = manager.replay().await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 2);
        // C was not attempted: no skipping ahead past a failure.
        assert_eq!(manager.fetcher.fetched_keys(), vec!["/api/a", "/api/b"]);

        // The next reconnect retries B first.
        manager.fetcher.heal("/api/b");
        let report = manager.on_reconnect().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.remaining, 0);
        assert_eq!(
            manager.fetcher.fetched_keys(),
            vec!["/api/a", "/api/b", "/api/b", "/api/c"]
        );
    }

    #[tokio::test]
    async fn test_retention_rejects_stale_snapshot_at_insert() {
        let manager = manager(MockFetcher::online());
        let mut old = snapshot("/api/a");
        old.captured_at_ms = 0;

        let result = manager.enqueue(old).await;
        assert!(matches!(result, Err(SwError::RetentionExceeded)));
    }

    #[tokio::test]
    async fn test_eviction_drops_aged_entries() {
        let manager = manager(MockFetcher::online());

        // Aged entry written directly to the queue, as if a day passed
        // since a crashed session enqueued it.
        manager
            .queue()
            .append(expired_payload("/api/old"), 0)
            .await
            .unwrap();
        manager.enqueue(snapshot("/api/new")).await.unwrap();

        let evicted = manager.evict_expired().await.unwrap();
        assert_eq!(evicted, 1);

        let report = manager.replay().await.unwrap();
        assert_eq!(report.replayed, 1);
        // The aged entry was never re-issued.
        assert_eq!(manager.fetcher.fetched_keys(), vec!["/api/new"]);
    }

    #[tokio::test]
    async fn test_replay_evicts_before_replaying() {
        let manager = manager(MockFetcher::online());
        manager
            .queue()
            .append(expired_payload("/api/old"), 0)
            .await
            .unwrap();

        let report = manager.replay().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped_not_wedged() {
        let manager = manager(MockFetcher::online());
        manager
            .queue()
            .append(b"not json".to_vec(), now_ms())
            .await
            .unwrap();
        manager.enqueue(snapshot("/api/a")).await.unwrap();

        let report = manager.replay().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let original = snapshot("/api/todos");
        let payload = serde_json::to_vec(&original).unwrap();
        let back: RequestSnapshot = serde_json::from_slice(&payload).unwrap();

        let request = back.to_request().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.cache_key(), "/api/todos");
    }
}
