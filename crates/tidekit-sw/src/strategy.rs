//! Caching strategies.
//!
//! Two strategies over the named caches:
//!
//! - **Cache-first** for static assets: a hit never touches the network;
//!   a miss fetches, stores, and returns. No fallback beyond that.
//! - **Network-first** for documents and navigation: the fetch races a
//!   deadline, a success overwrites the cached entry, and failures fall
//!   back to the exact cached entry and then the offline shell. The
//!   fallback order is load-bearing: stale-but-present content before an
//!   empty error state.
//!
//! The timeout race is cancellable; the losing future is dropped.

use std::sync::Arc;

use tracing::debug;

use tidekit_common::{now_ms, with_timeout};
use tidekit_store::{CacheHandle, CacheStore};

use crate::config::{CacheConfig, StrategyConfig};
use crate::fetch::{Fetcher, Request, Response, ResponseSource};
use crate::SwError;

/// Fallback tiers for a failed network-first fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFallback {
    /// Cached entry for this exact request, then the offline shell.
    ExactThenShell,
    /// Offline shell only; used for client-side navigation paths that have
    /// no individually cached counterpart.
    ShellOnly,
}

/// Executes caching strategies against the cache store and the network.
pub struct StrategyEngine<C: CacheStore, F: Fetcher> {
    caches: C,
    fetcher: Arc<F>,
    cache_config: CacheConfig,
    config: StrategyConfig,
}

impl<C: CacheStore, F: Fetcher> StrategyEngine<C, F> {
    /// Create an engine.
    pub fn new(
        caches: C,
        fetcher: Arc<F>,
        cache_config: CacheConfig,
        config: StrategyConfig,
    ) -> Self {
        Self {
            caches,
            fetcher,
            cache_config,
            config,
        }
    }

    /// Cache-first: serve from the static cache, fetch only on miss.
    pub async fn cache_first(&self, request: &Request) -> Result<Response, SwError> {
        let key = request.cache_key();
        let cache = self.caches.open(&self.cache_config.static_cache()).await?;

        if let Some(hit) = cache.get(&key).await? {
            debug!(%key, "cache hit");
            return Ok(Response::from_stored(&hit, ResponseSource::Cache));
        }

        debug!(%key, "cache miss");
        match self.fetch_with_timeout(request).await {
            Ok(response) => {
                cache.put(&key, response.to_stored(now_ms())).await?;
                Ok(response)
            }
            Err(err) => {
                // Static assets have no safe default to fall back to.
                Err(SwError::AssetUnavailable(format!("{key}: {err}")))
            }
        }
    }

    /// Network-first with timeout: store and return a fresh response, or
    /// fall back per `fallback`.
    pub async fn network_first(
        &self,
        request: &Request,
        fallback: CacheFallback,
    ) -> Result<Response, SwError> {
        let key = request.cache_key();
        let cache = self.caches.open(&self.cache_config.dynamic_cache()).await?;

        match self.fetch_with_timeout(request).await {
            Ok(response) => {
                cache.put(&key, response.to_stored(now_ms())).await?;
                Ok(response)
            }
            Err(err) => {
                debug!(%key, error = %err, "network-first falling back");

                if fallback == CacheFallback::ExactThenShell {
                    if let Some(hit) = cache.get(&key).await? {
                        return Ok(Response::from_stored(&hit, ResponseSource::Cache));
                    }
                }

                if let Some(shell) = self.lookup_shell().await? {
                    return Ok(Response::from_stored(&shell, ResponseSource::OfflineShell));
                }

                Err(SwError::NetworkAndCacheExhausted(key))
            }
        }
    }

    /// Network-first fetch for a mutating write: a success is stored in the
    /// dynamic cache and returned; a failure surfaces to the caller, which
    /// decides whether to queue the request. Never fabricates success.
    pub async fn mutating_write(&self, request: &Request) -> Result<Response, SwError> {
        let key = request.cache_key();
        let response = self.fetch_with_timeout(request).await?;

        let cache = self.caches.open(&self.cache_config.dynamic_cache()).await?;
        cache.put(&key, response.to_stored(now_ms())).await?;
        Ok(response)
    }

    /// Forward to the network with no caching.
    pub async fn pass_through(&self, request: &Request) -> Result<Response, SwError> {
        self.fetch_with_timeout(request).await
    }

    /// One fetch attempt raced against the configured deadline.
    async fn fetch_with_timeout(&self, request: &Request) -> Result<Response, SwError> {
        let deadline = self.config.network_timeout;
        match with_timeout(deadline, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(SwError::Timeout(deadline)),
        }
    }

    /// The offline shell lives in the static cache (it is precached); the
    /// dynamic cache is checked second in case a host runs without one.
    async fn lookup_shell(&self) -> Result<Option<tidekit_store::StoredResponse>, SwError> {
        let shell = &self.config.offline_shell;

        let static_cache = self.caches.open(&self.cache_config.static_cache()).await?;
        if let Some(hit) = static_cache.get(shell).await? {
            return Ok(Some(hit));
        }

        let dynamic_cache = self.caches.open(&self.cache_config.dynamic_cache()).await?;
        Ok(dynamic_cache.get(shell).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Destination;
    use crate::support::MockFetcher;
    use tidekit_store::{MemoryCacheStore, StoredResponse};
    use url::Url;

    fn engine(
        caches: MemoryCacheStore,
        fetcher: MockFetcher,
    ) -> StrategyEngine<MemoryCacheStore, MockFetcher> {
        StrategyEngine::new(
            caches,
            Arc::new(fetcher),
            CacheConfig::default(),
            StrategyConfig::default(),
        )
    }

    fn get(url: &str, destination: Destination) -> Request {
        Request::get(Url::parse(url).unwrap(), destination)
    }

    async fn seed_shell(caches: &MemoryCacheStore) {
        let cache = caches.open("pwa-static-v1").await.unwrap();
        cache
            .put(
                "/index.html",
                StoredResponse::new(200, b"<shell>".to_vec(), 1),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let caches = MemoryCacheStore::new();
        let engine = engine(caches.clone(), MockFetcher::online());
        let request = get("https://app.example/styles/app.css", Destination::Style);

        let response = engine.cache_first(&request).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);

        let cache = caches.open("pwa-static-v1").await.unwrap();
        assert!(cache.get("/styles/app.css").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let caches = MemoryCacheStore::new();
        let engine = engine(caches.clone(), MockFetcher::online());
        let request = get("https://app.example/styles/app.css", Destination::Style);

        engine.cache_first(&request).await.unwrap();
        let calls_after_miss = engine.fetcher.calls();

        let response = engine.cache_first(&request).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        // Zero network calls for a hit.
        assert_eq!(engine.fetcher.calls(), calls_after_miss);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_is_unavailable() {
        let engine = engine(MemoryCacheStore::new(), MockFetcher::offline());
        let request = get("https://app.example/styles/app.css", Destination::Style);

        let result = engine.cache_first(&request).await;
        assert!(matches!(result, Err(SwError::AssetUnavailable(_))));
    }

    #[tokio::test]
    async fn test_network_first_success_overwrites_cache() {
        let caches = MemoryCacheStore::new();
        let fetcher = MockFetcher::online();
        fetcher.respond("/data.json", 200, b"fresh");
        let engine = engine(caches.clone(), fetcher);

        let cache = caches.open("pwa-dynamic-v1").await.unwrap();
        cache
            .put("/data.json", StoredResponse::new(200, b"stale".to_vec(), 1))
            .await
            .unwrap();

        let request = get("https://app.example/data.json", Destination::Other);
        let response = engine
            .network_first(&request, CacheFallback::ExactThenShell)
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"fresh");

        let stored = cache.get("/data.json").await.unwrap().unwrap();
        assert_eq!(stored.body, b"fresh");
    }

    #[tokio::test]
    async fn test_network_first_offline_serves_cached_entry() {
        let caches = MemoryCacheStore::new();
        seed_shell(&caches).await;
        let engine = engine(caches.clone(), MockFetcher::offline());

        let cache = caches.open("pwa-dynamic-v1").await.unwrap();
        cache
            .put("/data.json", StoredResponse::new(200, b"stale".to_vec(), 1))
            .await
            .unwrap();

        let request = get("https://app.example/data.json", Destination::Other);
        let response = engine
            .network_first(&request, CacheFallback::ExactThenShell)
            .await
            .unwrap();

        // Stale-but-present content beats the shell.
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"stale");
    }

    #[tokio::test]
    async fn test_network_first_offline_no_entry_serves_shell() {
        let caches = MemoryCacheStore::new();
        seed_shell(&caches).await;
        let engine = engine(caches, MockFetcher::offline());

        let request = get("https://app.example/data.json", Destination::Other);
        let response = engine
            .network_first(&request, CacheFallback::ExactThenShell)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::OfflineShell);
        assert_eq!(response.body, b"<shell>");
    }

    #[tokio::test]
    async fn test_network_first_exhausted() {
        let engine = engine(MemoryCacheStore::new(), MockFetcher::offline());
        let request = get("https://app.example/data.json", Destination::Other);

        let result = engine
            .network_first(&request, CacheFallback::ExactThenShell)
            .await;
        assert!(matches!(result, Err(SwError::NetworkAndCacheExhausted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_first_timeout_falls_back() {
        let caches = MemoryCacheStore::new();
        let fetcher = MockFetcher::online();
        fetcher.hang("/data.json");
        let engine = engine(caches.clone(), fetcher);

        let cache = caches.open("pwa-dynamic-v1").await.unwrap();
        cache
            .put("/data.json", StoredResponse::new(200, b"stale".to_vec(), 1))
            .await
            .unwrap();

        let request = get("https://app.example/data.json", Destination::Other);
        let response = engine
            .network_first(&request, CacheFallback::ExactThenShell)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"stale");
    }

    #[tokio::test]
    async fn test_spa_fallback_skips_exact_lookup() {
        let caches = MemoryCacheStore::new();
        seed_shell(&caches).await;
        let engine = engine(caches.clone(), MockFetcher::offline());

        // A cached entry for the exact path exists, but SPA routes go
        // straight to the shell.
        let cache = caches.open("pwa-dynamic-v1").await.unwrap();
        cache
            .put(
                "/app/settings",
                StoredResponse::new(200, b"old page".to_vec(), 1),
            )
            .await
            .unwrap();

        let request = get("https://app.example/app/settings", Destination::Other);
        let response = engine
            .network_first(&request, CacheFallback::ShellOnly)
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::OfflineShell);
    }

    #[tokio::test]
    async fn test_mutating_write_failure_surfaces() {
        let engine = engine(MemoryCacheStore::new(), MockFetcher::offline());
        let request = Request::post(
            Url::parse("https://app.example/api/todos").unwrap(),
            b"{}".to_vec(),
        );

        let result = engine.mutating_write(&request).await;
        assert!(matches!(result, Err(SwError::FetchFailure(_))));
    }

    #[tokio::test]
    async fn test_pass_through_does_not_cache() {
        let caches = MemoryCacheStore::new();
        let engine = engine(caches.clone(), MockFetcher::online());
        let request = get("https://app.example/feed.xml", Destination::Other);

        engine.pass_through(&request).await.unwrap();

        for name in ["pwa-static-v1", "pwa-dynamic-v1"] {
            let cache = caches.open(name).await.unwrap();
            assert!(cache.get("/feed.xml").await.unwrap().is_none());
        }
    }
}
