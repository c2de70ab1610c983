//! Replay Queue
//!
//! Enqueue, inspect and replay durable mutations. Every storage call runs on
//! the blocking pool so the async tasks never wait on SQLite directly.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::{to_rfc3339, SharedClock};
use crate::db::{Database, StorageError};
use crate::error::{ProxyError, Result};
use crate::models::ProxyRequest;
use crate::queue::{QueuedRequest, ReplayOutcome, ReplayReport, ReplayStatus, RetentionPolicy};
use crate::strategy::{is_hop_by_hop, Upstream};

// == Replay Queue ==
/// Handle to the process-wide replay queue. Clones share the same queue.
#[derive(Clone)]
pub struct ReplayQueue {
    db: Arc<Database>,
    upstream: Arc<dyn Upstream>,
    clock: SharedClock,
    retention: RetentionPolicy,
    /// Held for a whole replay pass so two passes never interleave
    replay_lock: Arc<Mutex<()>>,
}

impl ReplayQueue {
    pub fn new(
        db: Arc<Database>,
        upstream: Arc<dyn Upstream>,
        clock: SharedClock,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            db,
            upstream,
            clock,
            retention,
            replay_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    async fn with_db<T, F>(&self, f: F) -> std::result::Result<T, StorageError>
    where
        F: FnOnce(&Database) -> std::result::Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    // == Enqueue ==
    /// Persists a mutation and returns it with its id.
    ///
    /// Returns only after the row is durably written. A storage failure is
    /// reported as [`ProxyError::QueuePersistence`]; the request is then not
    /// queued and the caller must be told so.
    pub async fn enqueue(&self, req: &ProxyRequest) -> Result<QueuedRequest> {
        let method = req.method.to_string();
        let url = req.url.to_string();
        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .cloned()
            .collect();
        let body = req.body.clone();
        let now = self.clock.now_ms();

        let queued = self
            .with_db(move |db| db.insert_queued(&method, &url, &headers, &body, now))
            .await
            .map_err(|e| ProxyError::QueuePersistence(e.to_string()))?;

        info!(
            "Queued {} {} for replay (id {})",
            queued.method, queued.url, queued.id
        );
        Ok(queued)
    }

    // == Pending ==
    /// Number of mutations waiting to sync.
    pub async fn pending(&self) -> Result<usize> {
        Ok(self.with_db(|db| db.count_queued()).await?)
    }

    /// Snapshot of the queue in replay order.
    pub async fn entries(&self) -> Result<Vec<QueuedRequest>> {
        Ok(self.with_db(|db| db.load_queue()).await?)
    }

    async fn remove(&self, id: i64) -> Result<()> {
        self.with_db(move |db| db.delete_queued(id)).await?;
        Ok(())
    }

    // == Replay All ==
    /// Replays the queue oldest first.
    ///
    /// Entries past the retention window are dropped unsent and reported
    /// expired. The first transport failure bumps that entry's attempt count
    /// and ends the pass: nothing queued after a failing mutation is sent
    /// ahead of it.
    pub async fn replay_all(&self) -> Result<ReplayReport> {
        let _pass = self.replay_lock.lock().await;

        let mut report = ReplayReport::new(to_rfc3339(self.clock.now_ms()));
        let entries = self.with_db(|db| db.load_queue()).await?;

        for entry in entries {
            if self.retention.is_expired(entry.enqueued_at, self.clock.now_ms()) {
                self.remove(entry.id).await?;
                warn!(
                    "Dropped queued {} {} (id {}): older than the retention window",
                    entry.method, entry.url, entry.id
                );
                report.push(ReplayOutcome::new(&entry, ReplayStatus::Expired));
                continue;
            }

            let request = match entry.to_proxy_request() {
                Ok(request) => request,
                Err(e) => {
                    self.remove(entry.id).await?;
                    warn!("Discarded unreadable queued request {}: {}", entry.id, e);
                    report.push(ReplayOutcome::new(
                        &entry,
                        ReplayStatus::Discarded {
                            error: e.to_string(),
                        },
                    ));
                    continue;
                }
            };

            match self.upstream.fetch(&request).await {
                Ok(response) => {
                    self.remove(entry.id).await?;
                    info!(
                        "Replayed {} {} (id {}) -> {}",
                        entry.method, entry.url, entry.id, response.status
                    );
                    report.push(ReplayOutcome::new(
                        &entry,
                        ReplayStatus::Succeeded {
                            status: response.status,
                        },
                    ));
                }
                Err(e) => {
                    let id = entry.id;
                    let attempts = self
                        .with_db(move |db| db.record_failed_attempt(id))
                        .await?
                        .unwrap_or(entry.attempt_count + 1);
                    warn!(
                        "Replay of {} {} (id {}) failed on attempt {}: {}",
                        entry.method, entry.url, entry.id, attempts, e
                    );

                    let mut outcome = ReplayOutcome::new(
                        &entry,
                        ReplayStatus::Failed {
                            error: e.to_string(),
                        },
                    );
                    outcome.attempt_count = attempts;
                    report.push(outcome);
                    report.halted = true;
                    break;
                }
            }
        }

        report.remaining = self.with_db(|db| db.count_queued()).await?;
        info!(
            "Replay pass: {} succeeded, {} failed, {} expired, {} remaining",
            report.succeeded(),
            report.failed(),
            report.expired(),
            report.remaining
        );
        Ok(report)
    }

    // == Purge Expired ==
    /// Drops every entry past the retention window without sending it.
    pub async fn purge_expired(&self) -> Result<Vec<QueuedRequest>> {
        let _pass = self.replay_lock.lock().await;

        let now = self.clock.now_ms();
        let retention = self.retention;
        let expired: Vec<QueuedRequest> = self
            .with_db(|db| db.load_queue())
            .await?
            .into_iter()
            .filter(|entry| retention.is_expired(entry.enqueued_at, now))
            .collect();

        for entry in &expired {
            self.remove(entry.id).await?;
            warn!(
                "Dropped queued {} {} (id {}): older than the retention window",
                entry.method, entry.url, entry.id
            );
        }

        Ok(expired)
    }
}
