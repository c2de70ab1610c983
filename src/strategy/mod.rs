//! Strategy Module
//!
//! Cache-first, network-first and stale-while-revalidate over the cache store,
//! plus the write path that falls back to the replay queue.

mod engine;
mod upstream;

pub use engine::{PrecacheReport, StrategyEngine};
pub(crate) use upstream::is_hop_by_hop;
pub use upstream::{FetchError, HttpUpstream, Upstream};
