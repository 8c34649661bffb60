//! Route classification.
//!
//! Classifies every intercepted request into exactly one handling class.
//! Evaluation is first-match-wins over a fixed precedence, and the method
//! check runs before any path or destination rule: a POST to a
//! static-looking URL is a mutating write, never a cacheable read.

use tracing::trace;
use url::Url;

use crate::fetch::{Destination, Request};

/// Extensions served cache-first from the static cache.
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "woff2", "png", "jpg", "jpeg", "svg", "gif", "ico",
];

/// Extensions served network-first from the dynamic cache.
const DOCUMENT_EXTENSIONS: &[&str] = &["html", "json"];

/// Handling class for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Immutable asset: cache-first.
    StaticAsset,
    /// Document or JSON payload: network-first with cache fallback.
    DocumentOrJson,
    /// POST request: network with background-sync capture on failure.
    MutatingWrite,
    /// Client-side routed path: network-first with shell fallback only.
    SpaFallback,
    /// No rule matched: forward to the network, no caching.
    PassThrough,
}

/// Ordered route matcher.
#[derive(Debug, Clone)]
pub struct Router {
    /// Path prefix always treated as client-side navigation.
    pub app_prefix: String,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            app_prefix: "/app".to_string(),
        }
    }
}

impl Router {
    /// Create a router with a custom SPA path prefix.
    pub fn new(app_prefix: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
        }
    }

    /// Classify a request. Total: every request gets exactly one class.
    pub fn classify(&self, request: &Request) -> RouteClass {
        let class = if request.is_mutating() {
            RouteClass::MutatingWrite
        } else if is_static_asset(request) {
            RouteClass::StaticAsset
        } else if is_document(request) {
            RouteClass::DocumentOrJson
        } else if self.is_spa_path(&request.url) {
            RouteClass::SpaFallback
        } else {
            RouteClass::PassThrough
        };

        trace!(url = %request.url, ?class, "classified request");
        class
    }

    fn is_spa_path(&self, url: &Url) -> bool {
        let path = url.path();
        path.starts_with(&self.app_prefix) || !path.contains('.')
    }
}

fn is_static_asset(request: &Request) -> bool {
    matches!(
        request.destination,
        Destination::Style
            | Destination::Script
            | Destination::Worker
            | Destination::Image
            | Destination::Font
    ) || extension_in(&request.url, STATIC_EXTENSIONS)
}

fn is_document(request: &Request) -> bool {
    request.destination == Destination::Document
        || extension_in(&request.url, DOCUMENT_EXTENSIONS)
}

fn extension_in(url: &Url, extensions: &[&str]) -> bool {
    match path_extension(url) {
        Some(ext) => extensions.contains(&ext),
        None => false,
    }
}

/// Extension of the last path segment, if any.
fn path_extension(url: &Url) -> Option<&str> {
    let segment = url.path().rsplit('/').next()?;
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}
