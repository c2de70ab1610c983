//! Cache Writer Module
//!
//! Moves cache persistence off the request path. The store queues writes on a
//! channel; one task drains it and applies each batch on the blocking pool, in
//! the order the writes were issued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::db::Database;

// == Cache Write ==
#[derive(Debug)]
enum CacheWrite {
    Upsert(CacheEntry),
    Delete { namespace: String, key: String },
    Clear { namespace: String },
    Flush(oneshot::Sender<()>),
}

// == Cache Writer ==
/// Handle for queueing cache writes. Cloning shares the same writer task.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    tx: mpsc::UnboundedSender<CacheWrite>,
}

impl CacheWriter {
    pub fn upsert(&self, entry: CacheEntry) {
        self.send(CacheWrite::Upsert(entry));
    }

    pub fn delete(&self, namespace: &str, key: &str) {
        self.send(CacheWrite::Delete {
            namespace: namespace.to_string(),
            key: key.to_string(),
        });
    }

    pub fn clear(&self, namespace: &str) {
        self.send(CacheWrite::Clear {
            namespace: namespace.to_string(),
        });
    }

    /// Resolves once every write queued before the call has been applied.
    pub async fn flush(&self) {
        let (done, applied) = oneshot::channel();
        self.send(CacheWrite::Flush(done));
        let _ = applied.await;
    }

    fn send(&self, write: CacheWrite) {
        if self.tx.send(write).is_err() {
            warn!("Cache writer stopped; dropping cache write");
        }
    }
}

// == Spawn ==
/// Starts the writer task for `db`.
///
/// The task ends once every [`CacheWriter`] clone has been dropped and the
/// queue is drained. Must be called inside a tokio runtime.
pub fn spawn_cache_writer(db: Arc<Database>) -> (CacheWriter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = rx.try_recv() {
                batch.push(next);
            }

            let db = db.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || apply(&db, batch)).await {
                warn!("Cache write batch failed: {}", e);
            }
        }
        debug!("Cache writer stopped");
    });

    (CacheWriter { tx }, handle)
}

// Writes are best-effort: a failure leaves memory and disk out of step until
// the next write for the key.
fn apply(db: &Database, batch: Vec<CacheWrite>) {
    for write in batch {
        match write {
            CacheWrite::Upsert(entry) => {
                if let Err(e) = db.upsert_cache_entry(&entry) {
                    warn!(
                        "Failed to persist cache entry in '{}': {}",
                        entry.namespace, e
                    );
                }
            }
            CacheWrite::Delete { namespace, key } => {
                if let Err(e) = db.delete_cache_entry(&namespace, &key) {
                    warn!("Failed to delete cache entry in '{}': {}", namespace, e);
                }
            }
            CacheWrite::Clear { namespace } => {
                if let Err(e) = db.clear_cache_namespace(&namespace) {
                    warn!("Failed to clear namespace '{}' on disk: {}", namespace, e);
                }
            }
            CacheWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
