//! Install-time precaching.
//!
//! Seeds the static cache from a build-time manifest. Seeding is
//! all-or-nothing: one failed fetch fails the whole pass, so install never
//! reports success over a partially populated precache. Entries are
//! content-addressed by revision, which makes re-seeding an unchanged
//! manifest a per-entry no-op.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use tidekit_common::now_ms;
use tidekit_store::{CacheHandle, CacheStore};

use crate::config::CacheConfig;
use crate::fetch::{Destination, Fetcher, Request};
use crate::SwError;

/// One manifest entry: a root-relative URL plus its content revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    /// Root-relative asset URL, e.g. "/index.html".
    pub url: String,
    /// Build-time content revision.
    pub revision: String,
}

impl PrecacheEntry {
    /// Create an entry.
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: revision.into(),
        }
    }
}

/// Outcome of a seed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Entries fetched and stored.
    pub fetched: usize,
    /// Entries skipped because the stored revision already matched.
    pub skipped: usize,
}

/// Seeds and queries the static cache.
pub struct PrecacheManager<C: CacheStore, F: Fetcher> {
    caches: C,
    fetcher: Arc<F>,
    config: CacheConfig,
    scope: Url,
}

impl<C: CacheStore, F: Fetcher> PrecacheManager<C, F> {
    /// Create a manager. `scope` is the worker's origin, used to resolve
    /// root-relative manifest URLs into fetchable ones.
    pub fn new(caches: C, fetcher: Arc<F>, config: CacheConfig, scope: Url) -> Self {
        Self {
            caches,
            fetcher,
            config,
            scope,
        }
    }

    /// Seed the static cache from a manifest.
    ///
    /// Fails on the first fetch error; the caller should retry the entire
    /// install rather than activate over a partial precache.
    pub async fn seed(&self, manifest: &[PrecacheEntry]) -> Result<SeedReport, SwError> {
        // Uniqueness by URL: a later duplicate wins.
        let mut order: Vec<&str> = Vec::new();
        let mut by_url: HashMap<&str, &PrecacheEntry> = HashMap::new();
        for entry in manifest {
            if by_url.insert(entry.url.as_str(), entry).is_some() {
                debug!(url = %entry.url, "duplicate precache url, later revision wins");
            } else {
                order.push(entry.url.as_str());
            }
        }

        let cache = self.caches.open(&self.config.static_cache()).await?;
        let mut report = SeedReport::default();

        for url in order {
            let entry = by_url[url];

            if let Some(existing) = cache.get(&entry.url).await? {
                if existing.revision.as_deref() == Some(entry.revision.as_str()) {
                    report.skipped += 1;
                    continue;
                }
            }

            let absolute = self
                .scope
                .join(&entry.url)
                .map_err(|e| SwError::FetchFailure(format!("bad precache url {}: {e}", entry.url)))?;
            let request = Request::get(absolute, Destination::Other);

            let response = self.fetcher.fetch(&request).await?;
            if !response.is_success() {
                return Err(SwError::FetchFailure(format!(
                    "precache fetch of {} returned status {}",
                    entry.url, response.status
                )));
            }

            let stored = response.to_stored(now_ms()).with_revision(&entry.revision);
            cache.put(&entry.url, stored).await?;
            report.fetched += 1;
        }

        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            cache = %self.config.static_cache(),
            "precache seeded"
        );
        Ok(report)
    }

    /// Whether a URL was seeded by the precache (revision-tagged entry in
    /// the static cache).
    pub async fn is_precached(&self, url: &Url) -> Result<bool, SwError> {
        let cache = self.caches.open(&self.config.static_cache()).await?;
        let key = Request::get(url.clone(), Destination::Other).cache_key();
        Ok(cache
            .get(&key)
            .await?
            .map(|entry| entry.revision.is_some())
            .unwrap_or(false))
    }
}
