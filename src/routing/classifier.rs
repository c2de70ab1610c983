//! Route Classifier
//!
//! Pure, total mapping from a request to `{ strategy, namespace }`.

use std::fmt;

use serde::Serialize;

use crate::cache::{API, ASSETS, IMAGES, PAGES};
use crate::models::{Destination, ProxyRequest};

/// Path prefix that marks API requests unless configured otherwise.
pub const DEFAULT_API_PREFIX: &str = "/api/";

// == Strategy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    /// Reads go network-first, mutations go to the network or the replay queue
    Api,
    /// No caching; forward and return whatever happens
    Passthrough,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheFirst => write!(f, "cache-first"),
            Self::NetworkFirst => write!(f, "network-first"),
            Self::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
            Self::Api => write!(f, "api"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

// == Classification ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub strategy: Strategy,
    /// `None` only for pass-through
    pub namespace: Option<&'static str>,
}

impl Classification {
    const fn new(strategy: Strategy, namespace: &'static str) -> Self {
        Self {
            strategy,
            namespace: Some(namespace),
        }
    }

    pub const fn passthrough() -> Self {
        Self {
            strategy: Strategy::Passthrough,
            namespace: None,
        }
    }
}

// == Route Classifier ==
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    api_prefix: String,
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_API_PREFIX)
    }
}

impl RouteClassifier {
    /// Creates a classifier. The prefix gains a leading slash if it lacks one.
    pub fn new(api_prefix: impl Into<String>) -> Self {
        let mut api_prefix = api_prefix.into();
        if !api_prefix.starts_with('/') {
            api_prefix.insert(0, '/');
        }
        Self { api_prefix }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    fn is_api_path(&self, path: &str) -> bool {
        // "/api/" also claims the bare "/api"
        path.starts_with(&self.api_prefix) || path == self.api_prefix.trim_end_matches('/')
    }

    // == Classify ==
    /// Classifies a request; first match wins.
    ///
    /// 1. Navigation → network-first, "pages"
    /// 2. Style, script or worker → stale-while-revalidate, "assets"
    /// 3. Image → cache-first, "images"
    /// 4. Under the API prefix → api, "api"
    /// 5. Anything else → pass-through
    ///
    /// Rules 1-3 only match GET and HEAD; an unsafe method outside the API
    /// prefix is never cached.
    pub fn classify(&self, req: &ProxyRequest) -> Classification {
        if req.is_read() {
            if req.is_navigation() {
                return Classification::new(Strategy::NetworkFirst, PAGES);
            }

            match req.destination {
                Destination::Style | Destination::Script | Destination::Worker => {
                    return Classification::new(Strategy::StaleWhileRevalidate, ASSETS);
                }
                Destination::Image => {
                    return Classification::new(Strategy::CacheFirst, IMAGES);
                }
                _ => {}
            }
        }

        if self.is_api_path(req.url.path()) {
            return Classification::new(Strategy::Api, API);
        }

        Classification::passthrough()
    }
}
