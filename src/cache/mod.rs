//! Cache Module
//!
//! Namespaced response storage with LRU-by-count eviction and TTL-by-age expiry,
//! persisted through a background writer.

mod entry;
mod lru;
mod namespace;
mod stats;
mod store;
mod writer;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use namespace::{default_policies, NamespacePolicy, API, ASSETS, IMAGES, PAGES};
pub use stats::CacheStats;
pub use store::{CacheStore, Lookup};
pub use writer::{spawn_cache_writer, CacheWriter};
