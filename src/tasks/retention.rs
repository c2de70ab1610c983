//! Retention Sweep Task
//!
//! Background task that periodically drops queued mutations past the
//! retention window, so they are reported lost without waiting for a reconnect.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::queue::ReplayQueue;

/// Spawns a background task that periodically purges expired queue entries.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_retention_task(queue: ReplayQueue, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting retention sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match queue.purge_expired().await {
                Ok(expired) if !expired.is_empty() => {
                    warn!(
                        "Retention sweep: {} queued mutation(s) permanently failed",
                        expired.len()
                    );
                }
                Ok(_) => debug!("Retention sweep: nothing expired"),
                Err(e) => error!("Retention sweep failed: {}", e),
            }
        }
    })
}
