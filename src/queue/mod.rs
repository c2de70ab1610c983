//! Replay Queue Module
//!
//! Durable FIFO of mutations that could not reach the network, replayed in
//! issue order when connectivity returns.

mod replay;
mod report;
mod request;

pub use replay::ReplayQueue;
pub use report::{ReplayOutcome, ReplayReport, ReplayStatus};
pub use request::{QueuedRequest, RetentionPolicy};
