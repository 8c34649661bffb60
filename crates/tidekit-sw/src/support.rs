//! Shared test support: a scriptable mock transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use hashbrown::HashMap;

use crate::fetch::{FetchError, Fetcher, Request, Response};

#[derive(Debug, Clone)]
enum Script {
    Respond(u16, Vec<u8>),
    Fail,
    Hang,
}

/// Scriptable fetcher: per-key outcomes over a default, with a call
/// counter and an ordered log of fetched keys.
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    default: Mutex<Script>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn with_default(default: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Mutex::new(default),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch succeeds with 200 "ok" unless scripted otherwise.
    pub fn online() -> Self {
        Self::with_default(Script::Respond(200, b"ok".to_vec()))
    }

    /// Every fetch fails with a network error unless scripted otherwise.
    pub fn offline() -> Self {
        Self::with_default(Script::Fail)
    }

    /// Script a response for one key.
    pub fn respond(&self, key: &str, status: u16, body: &[u8]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), Script::Respond(status, body.to_vec()));
    }

    /// Script a network error for one key.
    pub fn fail(&self, key: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), Script::Fail);
    }

    /// Script a fetch that never completes for one key.
    pub fn hang(&self, key: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), Script::Hang);
    }

    /// Drop the script for one key, falling back to the default.
    pub fn heal(&self, key: &str) {
        self.scripts.lock().unwrap().remove(key);
    }

    /// Connectivity restored: drop all scripts and succeed by default.
    pub fn heal_all(&self) {
        self.scripts.lock().unwrap().clear();
        *self.default.lock().unwrap() = Script::Respond(200, b"ok".to_vec());
    }

    /// Total fetch attempts.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cache keys of every fetch attempt, in order.
    pub fn fetched_keys(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(key.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default.lock().unwrap().clone());

        match script {
            Script::Respond(status, body) => Ok(Response::network(status, body)),
            Script::Fail => Err(FetchError::Network("connection refused".to_string())),
            Script::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
