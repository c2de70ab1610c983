//! Connectivity Monitor
//!
//! Probes the upstream periodically and fires the reconnect signal on every
//! offline → online transition, and again on each tick while the upstream is
//! reachable and mutations are still queued.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::lifecycle::LifecycleController;
use crate::models::ProxyRequest;

// == Connectivity ==
/// Last observed reachability. Starts offline so the first successful probe
/// after start-up counts as a reconnect.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    online: bool,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Records a probe result. Returns true on an offline → online transition.
    pub fn observe(&mut self, reachable: bool) -> bool {
        let reconnected = reachable && !self.online;
        if self.online && !reachable {
            info!("Upstream unreachable; relay is offline");
        }
        self.online = reachable;
        reconnected
    }
}

/// Spawns the probe loop. Any HTTP response counts as reachable.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_connectivity_monitor(
    controller: Arc<LifecycleController>,
    probe_url: Url,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting connectivity monitor for {} every {} seconds",
            probe_url,
            interval.as_secs()
        );

        let probe = ProxyRequest::new(Method::HEAD, probe_url);
        let mut connectivity = Connectivity::default();

        loop {
            let reachable = match controller.engine().upstream().fetch(&probe).await {
                Ok(_) => true,
                Err(e) => {
                    debug!("Connectivity probe failed: {}", e);
                    false
                }
            };

            let replay = if connectivity.observe(reachable) {
                info!("Upstream reachable; replaying queued mutations");
                true
            } else if reachable {
                // A pass that halted while online is retried until the queue drains
                match controller.engine().queue().pending().await {
                    Ok(0) => false,
                    Ok(pending) => {
                        debug!("{} mutations still queued; retrying replay", pending);
                        true
                    }
                    Err(e) => {
                        warn!("Could not read the replay queue: {}", e);
                        false
                    }
                }
            } else {
                false
            };

            if replay {
                if let Err(e) = controller.reconnect().await {
                    error!("Replay after reconnect failed: {}", e);
                }
            }

            tokio::time::sleep(interval).await;
        }
    })
}
