//! Cache naming and strategy configuration.
//!
//! No worker-global state: every component receives its configuration at
//! construction.

use std::time::Duration;

/// Purpose tag of a named cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePurpose {
    /// Precached assets, seeded at install time.
    Static,
    /// Runtime cache, populated lazily per request.
    Dynamic,
}

impl CachePurpose {
    /// Name segment for this purpose.
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePurpose::Static => "static",
            CachePurpose::Dynamic => "dynamic",
        }
    }
}

/// Cache naming scheme: `{prefix}-{purpose}-{version}`.
///
/// Exactly one live cache exists per purpose tag; caches carrying an older
/// version are deleted during activation.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Application prefix, e.g. "pwa".
    pub prefix: String,
    /// Cache version, e.g. "v1".
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "pwa".to_string(),
            version: "v1".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a naming scheme.
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
        }
    }

    /// Full cache name for a purpose tag.
    pub fn cache_name(&self, purpose: CachePurpose) -> String {
        format!("{}-{}-{}", self.prefix, purpose.as_str(), self.version)
    }

    /// Name of the static (precache) cache.
    pub fn static_cache(&self) -> String {
        self.cache_name(CachePurpose::Static)
    }

    /// Name of the dynamic (runtime) cache.
    pub fn dynamic_cache(&self) -> String {
        self.cache_name(CachePurpose::Dynamic)
    }

    /// Whether a cache name belongs to this application.
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&format!("{}-", self.prefix))
    }

    /// Whether a cache name carries the current version.
    pub fn is_current(&self, name: &str) -> bool {
        name.ends_with(&format!("-{}", self.version))
    }

    /// Whether a cache name is ours but from a superseded version.
    pub fn is_stale(&self, name: &str) -> bool {
        self.owns(name) && !self.is_current(name)
    }
}

/// Strategy engine configuration.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Deadline for the network leg of every strategy.
    pub network_timeout: Duration,
    /// Cache key of the offline-fallback document.
    pub offline_shell: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(3),
            offline_shell: "/index.html".to_string(),
        }
    }
}
