//! Top-level request interception.
//!
//! One entry point for the host's request pipeline: classify, execute the
//! matching strategy, and always hand back a response. Unrecovered
//! failures become explicit error responses, never propagated errors or
//! hangs.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tidekit_common::now_ms;
use tidekit_store::{CacheStore, RetryQueue};

use crate::config::{CacheConfig, StrategyConfig};
use crate::fetch::{Fetcher, Request, Response};
use crate::routes::{RouteClass, Router};
use crate::strategy::{CacheFallback, StrategyEngine};
use crate::sync::{ReplayReport, RequestSnapshot, SyncConfig, SyncQueueManager};
use crate::SwError;

/// A message from the application to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Request an immediate replay pass outside the normal reconnect
    /// signal.
    TriggerSync,
    /// Anything else; ignored.
    Unknown(String),
}

impl Message {
    /// Parse a host message type string.
    pub fn parse(message_type: &str) -> Self {
        match message_type {
            "TRIGGER_SYNC" => Message::TriggerSync,
            other => Message::Unknown(other.to_string()),
        }
    }
}

/// Dispatches every intercepted request through the route matcher and
/// strategy engine.
pub struct Dispatcher<C: CacheStore, Q: RetryQueue, F: Fetcher> {
    router: Router,
    strategies: StrategyEngine<C, F>,
    sync: SyncQueueManager<Q, F>,
}

impl<C: CacheStore, Q: RetryQueue, F: Fetcher> Dispatcher<C, Q, F> {
    /// Create a dispatcher over the given stores and transport.
    pub fn new(
        caches: C,
        queue: Q,
        fetcher: Arc<F>,
        cache_config: CacheConfig,
        strategy_config: StrategyConfig,
        sync_config: SyncConfig,
    ) -> Self {
        Self {
            router: Router::default(),
            strategies: StrategyEngine::new(
                caches,
                fetcher.clone(),
                cache_config,
                strategy_config,
            ),
            sync: SyncQueueManager::new(queue, fetcher, sync_config),
        }
    }

    /// Replace the default router.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// The sync queue manager, for host reconnect signals.
    pub fn sync(&self) -> &SyncQueueManager<Q, F> {
        &self.sync
    }

    /// Handle one intercepted request.
    ///
    /// Never fails: terminal strategy errors are converted into explicit
    /// 503 responses so the host pipeline always gets something well-formed.
    pub async fn handle(&self, request: Request) -> Response {
        debug!(method = %request.method, url = %request.url, "intercepted request");

        let class = self.router.classify(&request);
        let result = match class {
            RouteClass::StaticAsset => self.strategies.cache_first(&request).await,
            RouteClass::DocumentOrJson => {
                self.strategies
                    .network_first(&request, CacheFallback::ExactThenShell)
                    .await
            }
            RouteClass::SpaFallback => {
                self.strategies
                    .network_first(&request, CacheFallback::ShellOnly)
                    .await
            }
            RouteClass::MutatingWrite => self.handle_mutating(&request).await,
            RouteClass::PassThrough => self.strategies.pass_through(&request).await,
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %request.url, ?class, error = %err, "request failed");
                Response::error(&err.to_string())
            }
        }
    }

    /// Network-first for a write; on connectivity failure the request is
    /// queued for replay and the caller gets an explicit "queued" result.
    async fn handle_mutating(&self, request: &Request) -> Result<Response, SwError> {
        match self.strategies.mutating_write(request).await {
            Ok(response) => Ok(response),
            Err(SwError::Timeout(_)) | Err(SwError::FetchFailure(_)) => {
                let snapshot = RequestSnapshot::capture(request, now_ms());
                let id = self.sync.enqueue(snapshot).await?;
                info!(url = %request.url, ?id, "write queued for background sync");
                Ok(Response::queued(id.0))
            }
            Err(other) => Err(other),
        }
    }

    /// Handle an application message.
    pub async fn on_message(&self, message: Message) -> Option<ReplayReport> {
        match message {
            Message::TriggerSync => match self.sync.replay().await {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(error = %err, "triggered sync pass failed");
                    None
                }
            },
            Message::Unknown(message_type) => {
                debug!(%message_type, "ignoring unknown message");
                None
            }
        }
    }
}
