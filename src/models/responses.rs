//! Response models
//!
//! Response payloads flowing through the strategies, plus DTOs for the control API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::CacheStats;
use crate::lifecycle::LifecycleState;

/// Header set on every intercepted response naming where it came from.
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Header set on the synthetic response for a queued mutation, carrying its id.
pub const QUEUED_HEADER: &str = "x-offline-queued";

// == Response Payload ==
/// Status, headers and body of a response, as stored and as returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub status: u16,
    /// Header pairs, names lowercased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponsePayload {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            body: body.into(),
        }
    }

    /// Returns the first value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 2xx and not marked `no-store`.
    pub fn is_cacheable(&self) -> bool {
        let no_store = self
            .header("cache-control")
            .is_some_and(|cc| cc.to_ascii_lowercase().contains("no-store"));
        (200..300).contains(&self.status) && !no_store
    }

    /// The synthetic "accepted, queued" response for a mutation held in the replay queue.
    ///
    /// Uses 202 plus the [`QUEUED_HEADER`] marker so callers can tell it apart
    /// from a genuine server response.
    pub fn queued(id: i64) -> Self {
        let body = json!({
            "queued": true,
            "id": id,
            "message": "Offline: request queued and will be sent when connectivity returns",
        });

        Self::new(
            202,
            vec![
                ("content-type".to_string(), "application/json".to_string()),
                (QUEUED_HEADER.to_string(), id.to_string()),
            ],
            body.to_string(),
        )
    }

    /// True for the synthetic queued response.
    pub fn is_queued_marker(&self) -> bool {
        self.header(QUEUED_HEADER).is_some()
    }
}

// == Served ==
/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    /// Fresh from the network, cached if eligible
    Network,
    /// A non-expired cache entry
    Cache,
    /// An expired cache entry, served because nothing better was available
    StaleCache,
    /// Synthetic response for a queued mutation
    Queued,
    /// Forwarded without touching the cache
    Passthrough,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::StaleCache => "stale-cache",
            Self::Queued => "queued",
            Self::Passthrough => "passthrough",
        }
    }
}

/// A response plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub payload: ResponsePayload,
    pub source: ResponseSource,
}

impl Served {
    pub fn new(payload: ResponsePayload, source: ResponseSource) -> Self {
        Self { payload, source }
    }
}

// == Control API DTOs ==
/// Response body for the health endpoint (GET /__offline/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for the status endpoint (GET /__offline/status)
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: LifecycleState,
    pub active_version: Option<String>,
    pub pending_version: Option<String>,
    pub clients: usize,
    /// Mutations waiting to sync
    pub pending_sync: usize,
    /// Statistics per cache namespace
    pub namespaces: BTreeMap<String, CacheStats>,
}

/// Response body for the client registry endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClientsResponse {
    /// Clients connected after the call
    pub clients: usize,
}
