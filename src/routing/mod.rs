//! Routing Module
//!
//! Maps every intercepted request to a caching strategy and namespace.

mod classifier;

pub use classifier::{Classification, RouteClassifier, Strategy, DEFAULT_API_PREFIX};
