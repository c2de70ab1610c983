//! Queued Request Module
//!
//! The persisted form of a mutation and the retention window that bounds it.

use std::time::Duration;

use axum::http::Method;
use serde::Serialize;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::models::ProxyRequest;

// == Queued Request ==
/// One mutation waiting for delivery. Ascending `id` is replay order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedRequest {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    /// Unix milliseconds
    pub enqueued_at: u64,
    pub attempt_count: u32,
}

impl QueuedRequest {
    /// Rebuilds the request to send on replay.
    pub fn to_proxy_request(&self) -> Result<ProxyRequest> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| {
            ProxyError::InvalidRequest(format!("queued method '{}': {}", self.method, e))
        })?;
        let url = Url::parse(&self.url).map_err(|e| {
            ProxyError::InvalidRequest(format!("queued url '{}': {}", self.url, e))
        })?;

        Ok(ProxyRequest::from_parts(
            method,
            url,
            self.headers.clone(),
            self.body.clone(),
        ))
    }
}

// == Retention Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Age after which a queued request is discarded unsent
    pub max_retention: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

impl RetentionPolicy {
    pub fn new(max_retention: Duration) -> Self {
        Self { max_retention }
    }

    /// Expired once `now - enqueued_at` is strictly greater than the window.
    pub fn is_expired(&self, enqueued_at: u64, now_ms: u64) -> bool {
        u128::from(now_ms.saturating_sub(enqueued_at)) > self.max_retention.as_millis()
    }
}
