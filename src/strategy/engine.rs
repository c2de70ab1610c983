//! Strategy Engine
//!
//! Executes a classified request against the cache store, the network and,
//! for mutations that cannot be delivered, the replay queue.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Lookup, ASSETS};
use crate::clock::SharedClock;
use crate::error::{ProxyError, Result};
use crate::lifecycle::AssetManifest;
use crate::models::{ProxyRequest, ResponsePayload, ResponseSource, Served};
use crate::queue::ReplayQueue;
use crate::routing::{Classification, Strategy};
use crate::strategy::{FetchError, Upstream};

/// Query parameter carrying a manifest revision on precache fetches.
const REVISION_PARAM: &str = "__revision";

// == Precache Report ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecacheReport {
    /// Entries fetched and stored
    pub cached: usize,
    /// URLs that could not be fetched or stored
    pub failed: Vec<String>,
}

// == Strategy Engine ==
/// The only writer of the cache store and the only producer for the replay queue.
#[derive(Clone)]
pub struct StrategyEngine {
    cache: Arc<RwLock<CacheStore>>,
    upstream: Arc<dyn Upstream>,
    queue: ReplayQueue,
    clock: SharedClock,
}

impl StrategyEngine {
    pub fn new(
        cache: CacheStore,
        upstream: Arc<dyn Upstream>,
        queue: ReplayQueue,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
            upstream,
            queue,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<RwLock<CacheStore>> {
        &self.cache
    }

    pub fn queue(&self) -> &ReplayQueue {
        &self.queue
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Waits until every cache write issued so far is on disk.
    pub async fn flush_cache(&self) {
        let pending = self.cache.read().await.flush();
        pending.await;
    }

    // == Dispatch ==
    /// Runs the strategy a classification names.
    pub async fn handle(&self, req: &ProxyRequest, route: Classification) -> Result<Served> {
        match (route.strategy, route.namespace) {
            (Strategy::CacheFirst, Some(ns)) => self.cache_first(req, ns).await,
            (Strategy::NetworkFirst, Some(ns)) => self.network_first(req, ns).await,
            (Strategy::StaleWhileRevalidate, Some(ns)) => {
                self.stale_while_revalidate(req, ns).await
            }
            (Strategy::Api, Some(ns)) => self.api(req, ns).await,
            _ => self.passthrough(req).await,
        }
    }

    async fn key_for(&self, req: &ProxyRequest, namespace: &str) -> String {
        let policy = self.cache.read().await.policy(namespace);
        req.request_key(&policy.key_headers)
    }

    /// Writes a network response if it is cacheable, stamped with the time it
    /// arrived.
    async fn store(&self, namespace: &str, key: &str, payload: &ResponsePayload) {
        if !payload.is_cacheable() {
            debug!(
                "Not caching {} response in '{}'",
                payload.status, namespace
            );
            return;
        }

        let stored_at = self.clock.now_ms();
        self.cache
            .write()
            .await
            .put(namespace, key, payload.clone(), stored_at);
    }

    fn unavailable(req: &ProxyRequest, err: FetchError) -> ProxyError {
        ProxyError::NetworkUnavailable(format!("{} {}: {}", req.method, req.url, err))
    }

    async fn fetch_and_store(
        &self,
        req: &ProxyRequest,
        namespace: &str,
        key: &str,
    ) -> Result<Served> {
        let payload = self
            .upstream
            .fetch(req)
            .await
            .map_err(|e| Self::unavailable(req, e))?;

        self.store(namespace, key, &payload).await;
        Ok(Served::new(payload, ResponseSource::Network))
    }

    // == Cache First ==
    /// Serves a non-expired entry without touching the network; otherwise
    /// fetches, stores and returns.
    pub async fn cache_first(&self, req: &ProxyRequest, namespace: &str) -> Result<Served> {
        let key = self.key_for(req, namespace).await;

        let hit = self.cache.write().await.lookup_fresh(namespace, &key);
        if let Some(entry) = hit {
            debug!("cache-first hit in '{}': {}", namespace, req.url);
            return Ok(Served::new(entry.payload, ResponseSource::Cache));
        }

        self.fetch_and_store(req, namespace, &key).await
    }

    // == Network First ==
    /// Tries the network; on a transport failure serves the cached entry even
    /// if it has expired.
    pub async fn network_first(&self, req: &ProxyRequest, namespace: &str) -> Result<Served> {
        let key = self.key_for(req, namespace).await;

        let err = match self.upstream.fetch(req).await {
            Ok(payload) => {
                self.store(namespace, &key, &payload).await;
                return Ok(Served::new(payload, ResponseSource::Network));
            }
            Err(err) => err,
        };

        let fallback = self.cache.write().await.lookup_any(namespace, &key);
        match fallback {
            Some(Lookup { entry, expired }) => {
                info!(
                    "Network failed for {} ({}); serving {} copy from '{}'",
                    req.url,
                    err,
                    if expired { "stale" } else { "cached" },
                    namespace
                );
                let source = if expired {
                    ResponseSource::StaleCache
                } else {
                    ResponseSource::Cache
                };
                Ok(Served::new(entry.payload, source))
            }
            None => Err(Self::unavailable(req, err)),
        }
    }

    // == Stale While Revalidate ==
    /// Serves a non-expired entry at once and refreshes it in the background;
    /// with no usable entry, fetches synchronously like a cache-first miss.
    pub async fn stale_while_revalidate(
        &self,
        req: &ProxyRequest,
        namespace: &str,
    ) -> Result<Served> {
        let key = self.key_for(req, namespace).await;

        let hit = self.cache.write().await.lookup_fresh(namespace, &key);
        match hit {
            Some(entry) => {
                self.spawn_revalidation(req.clone(), namespace.to_string(), key);
                Ok(Served::new(entry.payload, ResponseSource::Cache))
            }
            None => self.fetch_and_store(req, namespace, &key).await,
        }
    }

    /// Best-effort refresh. Failures are logged and leave the entry as it was.
    fn spawn_revalidation(&self, req: ProxyRequest, namespace: String, key: String) {
        let engine = self.clone();

        tokio::spawn(async move {
            match engine.upstream.fetch(&req).await {
                Ok(payload) => {
                    engine.store(&namespace, &key, &payload).await;
                    debug!("Revalidated {} in '{}'", req.url, namespace);
                }
                Err(e) => debug!("Revalidation of {} failed: {}", req.url, e),
            }
        });
    }

    // == API ==
    /// Reads go network-first; mutations are delivered or queued.
    pub async fn api(&self, req: &ProxyRequest, namespace: &str) -> Result<Served> {
        if req.is_read() {
            self.network_first(req, namespace).await
        } else if req.is_mutation() {
            self.deliver_or_enqueue(req).await
        } else {
            self.passthrough(req).await
        }
    }

    /// Sends a mutation. Only a transport failure queues it; any HTTP response,
    /// error statuses included, is returned unmodified and never cached.
    ///
    /// While older mutations are still queued, a new one joins the back of the
    /// queue without being sent, so it can never overtake them.
    ///
    /// The synthetic queued response is produced only after the queue write
    /// completed.
    pub async fn deliver_or_enqueue(&self, req: &ProxyRequest) -> Result<Served> {
        let backlog = self
            .queue
            .pending()
            .await
            .map_err(|e| ProxyError::QueuePersistence(e.to_string()))?;
        if backlog > 0 {
            info!(
                "{} {} queued behind {} pending mutations",
                req.method, req.url, backlog
            );
            return self.enqueue(req).await;
        }

        match self.upstream.fetch(req).await {
            Ok(payload) => Ok(Served::new(payload, ResponseSource::Network)),
            Err(e) => {
                warn!("{} {} failed ({}); queueing for replay", req.method, req.url, e);
                self.enqueue(req).await
            }
        }
    }

    async fn enqueue(&self, req: &ProxyRequest) -> Result<Served> {
        let queued = self.queue.enqueue(req).await?;
        Ok(Served::new(
            ResponsePayload::queued(queued.id),
            ResponseSource::Queued,
        ))
    }

    // == Passthrough ==
    pub async fn passthrough(&self, req: &ProxyRequest) -> Result<Served> {
        let payload = self
            .upstream
            .fetch(req)
            .await
            .map_err(|e| Self::unavailable(req, e))?;
        Ok(Served::new(payload, ResponseSource::Passthrough))
    }

    // == Precache ==
    /// Seeds the "assets" namespace from a manifest, best-effort.
    ///
    /// A revisioned entry is fetched with the revision as a cache-busting
    /// query parameter but stored under its plain URL.
    pub async fn precache(&self, manifest: &AssetManifest, origin: &url::Url) -> PrecacheReport {
        let mut report = PrecacheReport::default();

        for (url, revision) in manifest.resolve(origin) {
            let req = ProxyRequest::new(axum::http::Method::GET, url.clone());
            let key = self.key_for(&req, ASSETS).await;

            let mut fetch_req = req.clone();
            if let Some(revision) = &revision {
                fetch_req
                    .url
                    .query_pairs_mut()
                    .append_pair(REVISION_PARAM, revision);
            }

            match self.upstream.fetch(&fetch_req).await {
                Ok(payload) if payload.is_cacheable() => {
                    self.store(ASSETS, &key, &payload).await;
                    report.cached += 1;
                }
                Ok(payload) => {
                    warn!("Precache of {} returned {}", url, payload.status);
                    report.failed.push(url.to_string());
                }
                Err(e) => {
                    warn!("Precache of {} failed: {}", url, e);
                    report.failed.push(url.to_string());
                }
            }
        }

        info!(
            "Precached {} assets ({} failed)",
            report.cached,
            report.failed.len()
        );
        report
    }
}
