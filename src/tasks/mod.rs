//! Background Tasks Module
//!
//! Contains background tasks that run periodically during relay operation.
//!
//! # Tasks
//! - Connectivity monitor: probes the upstream and fires the reconnect signal
//! - Retention sweep: drops queued mutations older than the retention window

mod connectivity;
mod retention;

pub use connectivity::{spawn_connectivity_monitor, Connectivity};
pub use retention::spawn_retention_task;
