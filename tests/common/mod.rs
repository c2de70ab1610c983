//! Shared harness for integration tests: a fully wired relay router over a
//! temporary database, talking to the crate's in-process upstream.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use offline_relay::cache::{default_policies, CacheStore};
use offline_relay::clock::ManualClock;
use offline_relay::db::Database;
use offline_relay::lifecycle::AssetManifest;
use offline_relay::queue::{ReplayQueue, RetentionPolicy};
use offline_relay::routing::RouteClassifier;
use offline_relay::{create_router, AppState, LifecycleController, StrategyEngine};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub use offline_relay::test_support::FakeUpstream;

pub const ORIGIN: &str = "https://bookings.test";
pub const T0: u64 = 1_750_000_000_000;

// == Relay ==
pub struct Relay {
    pub app: Router,
    pub controller: Arc<LifecycleController>,
    pub upstream: Arc<FakeUpstream>,
    pub clock: Arc<ManualClock>,
}

/// Builds a relay over `db_path` that is installed but not yet active.
pub fn relay_at(db_path: &Path, upstream: Arc<FakeUpstream>, clock: Arc<ManualClock>) -> Relay {
    let db = Arc::new(Database::open(db_path).unwrap());
    let cache = CacheStore::with_database(default_policies(), clock.clone(), db.clone()).unwrap();
    let queue = ReplayQueue::new(db, upstream.clone(), clock.clone(), RetentionPolicy::default());
    let engine = StrategyEngine::new(cache, upstream.clone(), queue, clock.clone());

    let origin = Url::parse(ORIGIN).unwrap();
    let controller = Arc::new(LifecycleController::new(
        engine,
        RouteClassifier::default(),
        origin.clone(),
    ));
    let app = create_router(AppState::new(controller.clone(), origin));

    Relay {
        app,
        controller,
        upstream,
        clock,
    }
}

/// A fresh relay that has installed an empty manifest and is active.
pub async fn active_relay(db_path: &Path) -> Relay {
    let relay = relay_at(
        db_path,
        Arc::new(FakeUpstream::default()),
        Arc::new(ManualClock::new(T0)),
    );
    relay
        .controller
        .install("1.0.0", &AssetManifest::default())
        .await
        .unwrap();
    relay.controller.activate().await.unwrap();
    relay
}

// == Requests ==
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    Reply {
        status,
        headers,
        body,
    }
}

pub fn navigate(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("sec-fetch-mode", "navigate")
        .header("sec-fetch-dest", "document")
        .body(Body::empty())
        .unwrap()
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub fn post_json(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
