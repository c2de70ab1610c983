//! Upstream Module
//!
//! The network seam: one trait for "send this request to the origin", and the
//! reqwest-backed implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::{ProxyRequest, ResponsePayload};

/// Headers that describe one connection rather than the message.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

// == Fetch Error ==
/// A transport-level failure: no response was received.
///
/// An HTTP error status is not a `FetchError`; it is a delivered response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,
}

// == Upstream Trait ==
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends the request to the network.
    async fn fetch(&self, req: &ProxyRequest) -> Result<ResponsePayload, FetchError>;
}

// == HTTP Upstream ==
/// Forwards requests with reqwest. Redirects are handed back to the caller
/// rather than followed.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

fn classify_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, req: &ProxyRequest) -> Result<ResponsePayload, FetchError> {
        let mut builder = self.client.request(req.method.clone(), req.url.clone());

        for (name, value) in &req.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let response = builder.send().await.map_err(classify_error)?;
        let status = response.status().as_u16();

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(classify_error)?;
        debug!("{} {} -> {}", req.method, req.url, status);

        Ok(ResponsePayload::new(status, headers, body.to_vec()))
    }
}
