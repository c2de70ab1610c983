//! Test doubles shared by the unit tests and, through the `test-util`
//! feature, the integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::Method;
use url::Url;

use crate::cache::{default_policies, CacheStore};
use crate::clock::ManualClock;
use crate::db::Database;
use crate::lifecycle::LifecycleController;
use crate::models::{ProxyRequest, ResponsePayload};
use crate::queue::{ReplayQueue, RetentionPolicy};
use crate::routing::RouteClassifier;
use crate::strategy::{FetchError, StrategyEngine, Upstream};

pub const ORIGIN: &str = "https://shop.test";

/// A request to `ORIGIN` + `path` with nothing inferred beyond the URL.
pub fn api_request(method: Method, path: &str) -> ProxyRequest {
    let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
    ProxyRequest::new(method, url)
}

/// In-process origin: records every call, answers from a table, and can be
/// switched offline as a whole or per path.
#[derive(Debug)]
pub struct FakeUpstream {
    online: AtomicBool,
    responses: Mutex<HashMap<String, ResponsePayload>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl Default for FakeUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            responses: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn fail_path(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.responses.lock().unwrap().insert(
            path.to_string(),
            ResponsePayload::new(status, vec![], body.as_bytes().to_vec()),
        );
    }

    pub fn respond_with(&self, path: &str, payload: ResponsePayload) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), payload);
    }

    /// Paths fetched so far, in call order.
    pub fn paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// "METHOD /path" per call, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, path)| format!("{method} {path}"))
            .collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p == path)
            .count()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch(&self, req: &ProxyRequest) -> Result<ResponsePayload, FetchError> {
        let path = req.url.path().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((req.method.clone(), path.clone()));

        if !self.online.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&path) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }

        let scripted = self.responses.lock().unwrap().get(&path).cloned();
        Ok(scripted.unwrap_or_else(|| {
            ResponsePayload::new(200, vec![], format!("{} {}", req.method, path))
        }))
    }
}

/// A controller over an in-memory database, default policies and the
/// default classifier, still in the `installing` state.
pub fn controller(
    upstream: Arc<FakeUpstream>,
    clock: Arc<ManualClock>,
) -> LifecycleController {
    let queue = ReplayQueue::new(
        Arc::new(Database::open_in_memory().unwrap()),
        upstream.clone(),
        clock.clone(),
        RetentionPolicy::default(),
    );
    let engine = StrategyEngine::new(
        CacheStore::new(default_policies(), clock.clone()),
        upstream,
        queue,
        clock,
    );
    LifecycleController::new(engine, RouteClassifier::default(), Url::parse(ORIGIN).unwrap())
}
