//! Namespace Policy Module
//!
//! Per-namespace limits: entry count, entry age and the headers that take part in keys.

use std::time::Duration;

// == Well-known Namespaces ==
/// Full-document loads
pub const PAGES: &str = "pages";
/// Styles, scripts and worker scripts
pub const ASSETS: &str = "assets";
/// Images
pub const IMAGES: &str = "images";
/// Reads under the API prefix
pub const API: &str = "api";

const DAY: u64 = 24 * 60 * 60;

// == Namespace Policy ==
/// Eviction policy for one isolated cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    pub name: String,
    /// LRU bound; `None` is unbounded
    pub max_entries: Option<usize>,
    /// TTL checked at read time; `None` never expires
    pub max_age: Option<Duration>,
    /// Request headers folded into the request key
    pub key_headers: Vec<String>,
}

impl NamespacePolicy {
    /// An unbounded policy with no key headers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: None,
            max_age: None,
            key_headers: Vec::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_key_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }
}

/// Policies for the four built-in namespaces.
pub fn default_policies() -> Vec<NamespacePolicy> {
    vec![
        NamespacePolicy::new(PAGES)
            .with_max_entries(50)
            .with_max_age(Duration::from_secs(7 * DAY)),
        NamespacePolicy::new(ASSETS)
            .with_max_entries(60)
            .with_max_age(Duration::from_secs(30 * DAY)),
        NamespacePolicy::new(IMAGES)
            .with_max_entries(100)
            .with_max_age(Duration::from_secs(30 * DAY)),
        NamespacePolicy::new(API)
            .with_max_entries(100)
            .with_max_age(Duration::from_secs(60 * 60))
            .with_key_headers(["authorization", "accept"]),
    ]
}
