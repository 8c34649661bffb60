//! Worker lifecycle: install, activate, supersede.
//!
//! The controller owns the lifecycle state machine and the two version
//! transitions: install (precache seeding) and activate (stale cache
//! cleanup plus client claim). Both are awaitable units of work; the host
//! must not serve requests under a new version until they resolve.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{info, warn};
use url::Url;

use tidekit_store::CacheStore;

use crate::config::CacheConfig;
use crate::fetch::Fetcher;
use crate::precache::{PrecacheEntry, PrecacheManager, SeedReport};
use crate::SwError;

/// Lifecycle state of a worker instance.
///
/// `Parsed` is the pre-install state: the instance exists but the host has
/// not signalled install yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Check if a state transition is valid.
fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installed, Activating)
            | (Activating, Activated)
    ) || (to == Redundant && from != Redundant)
}

/// Outcome of the activation cleanup sweep.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Stale caches deleted.
    pub deleted: Vec<String>,
    /// Stale caches whose deletion failed (best-effort, logged).
    pub failed: Vec<String>,
    /// Clients claimed by the new worker.
    pub claimed: usize,
}

impl CleanupReport {
    /// Whether every stale cache was deleted.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An open page the worker can control.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client id, assigned by the host.
    pub id: String,
    /// Page URL.
    pub url: String,
    /// Whether this worker controls the page.
    pub controlled: bool,
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    /// Register an open page.
    pub fn add(&mut self, id: impl Into<String>, url: impl Into<String>) {
        let id = id.into();
        self.clients.insert(
            id.clone(),
            Client {
                id,
                url: url.into(),
                controlled: false,
            },
        );
    }

    /// Remove a page (closed by the user).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Claim every registered page. Returns how many were claimed.
    pub fn claim_all(&mut self) -> usize {
        for client in self.clients.values_mut() {
            client.controlled = true;
        }
        self.clients.len()
    }

    /// Whether a page is controlled by this worker.
    pub fn is_controlled(&self, id: &str) -> bool {
        self.clients.get(id).map(|c| c.controlled).unwrap_or(false)
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Drives install and activate transitions for one worker instance.
pub struct LifecycleController<C: CacheStore, F: Fetcher> {
    state: LifecycleState,
    caches: C,
    config: CacheConfig,
    precache: PrecacheManager<C, F>,
    clients: ClientRegistry,
}

impl<C: CacheStore, F: Fetcher> LifecycleController<C, F> {
    /// Create a controller in the `Parsed` state.
    pub fn new(caches: C, fetcher: Arc<F>, config: CacheConfig, scope: Url) -> Self {
        let precache = PrecacheManager::new(caches.clone(), fetcher, config.clone(), scope);
        Self {
            state: LifecycleState::Parsed,
            caches,
            config,
            precache,
            clients: ClientRegistry::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Precache lookups for this instance.
    pub fn precache(&self) -> &PrecacheManager<C, F> {
        &self.precache
    }

    /// Open-page registry.
    pub fn clients_mut(&mut self) -> &mut ClientRegistry {
        &mut self.clients
    }

    /// Open-page registry (read-only).
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    fn transition(&mut self, to: LifecycleState) -> Result<(), SwError> {
        if !is_valid_transition(self.state, to) {
            return Err(SwError::InvalidStateTransition {
                from: self.state,
                to,
            });
        }
        info!(from = ?self.state, ?to, "lifecycle transition");
        self.state = to;
        Ok(())
    }

    /// Host install signal: seed the precache.
    ///
    /// On failure the instance becomes redundant and the error surfaces so
    /// the host can retry installation with a fresh instance; a partially
    /// seeded precache never reports success.
    pub async fn on_install(&mut self, manifest: &[PrecacheEntry]) -> Result<SeedReport, SwError> {
        self.transition(LifecycleState::Installing)?;

        match self.precache.seed(manifest).await {
            Ok(report) => {
                self.transition(LifecycleState::Installed)?;
                Ok(report)
            }
            Err(err) => {
                warn!(error = %err, "install failed, instance is redundant");
                self.transition(LifecycleState::Redundant)?;
                Err(err)
            }
        }
    }

    /// Host activate signal: delete caches from superseded versions and
    /// claim open pages.
    ///
    /// Cache deletion is best-effort per name; failures are collected and
    /// logged, never fatal to activation.
    pub async fn on_activate(&mut self) -> Result<CleanupReport, SwError> {
        self.transition(LifecycleState::Activating)?;

        let mut report = CleanupReport::default();
        for name in self.caches.cache_names().await? {
            if !self.config.is_stale(&name) {
                continue;
            }
            match self.caches.delete_cache(&name).await {
                Ok(_) => {
                    info!(cache = %name, "deleted stale cache");
                    report.deleted.push(name);
                }
                Err(err) => {
                    warn!(cache = %name, error = %err, "failed to delete stale cache");
                    report.failed.push(name);
                }
            }
        }

        report.claimed = self.clients.claim_all();
        self.transition(LifecycleState::Activated)?;

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed = report.claimed,
            "activation complete"
        );
        Ok(report)
    }

    /// A newer instance has taken over; this one stops handling requests.
    pub fn supersede(&mut self) {
        if self.state != LifecycleState::Redundant {
            info!(from = ?self.state, "instance superseded");
            self.state = LifecycleState::Redundant;
        }
    }
}
