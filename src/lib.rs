//! Offline Relay - an offline-capable caching proxy
//!
//! Intercepts application requests, serves them from namespaced caches with
//! per-route strategies, and queues mutations durably for replay when the
//! network comes back.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod routing;
pub mod strategy;
pub mod tasks;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use api::{create_router, AppState};
pub use config::Config;
pub use lifecycle::LifecycleController;
pub use strategy::StrategyEngine;
pub use tasks::{spawn_connectivity_monitor, spawn_retention_task};
