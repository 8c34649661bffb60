//! Timing helpers: cancellable timeouts and wall-clock milliseconds.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// The deadline passed before the wrapped operation finished.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Race a future against a deadline.
///
/// Whichever side loses is dropped, so a slow network fetch is cancelled
/// rather than left running after the timeout fires.
pub async fn with_timeout<T, F>(deadline: Duration, future: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| Elapsed(deadline))
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_with_timeout_completes() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            42
        })
        .await;

        assert_eq!(result, Err(Elapsed(Duration::from_millis(10))));
    }

    #[test]
    fn test_now_ms_nonzero() {
        assert!(now_ms() > 0);
    }
}
