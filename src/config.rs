//! Configuration Module
//!
//! Handles loading and managing relay configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::cache::{default_policies, NamespacePolicy};
use crate::queue::RetentionPolicy;
use crate::routing::DEFAULT_API_PREFIX;

/// Relay configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin every intercepted request is forwarded to
    pub upstream_origin: String,
    /// SQLite file backing the cache and the replay queue
    pub data_path: PathBuf,
    /// Path prefix routed through the API strategy
    pub api_prefix: String,
    /// Retention window for queued mutations, in hours
    pub retention_hours: u64,
    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,
    /// Path probed by the connectivity monitor
    pub probe_path: String,
    /// Connectivity probe interval in seconds
    pub probe_interval: u64,
    /// Queue retention sweep interval in seconds
    pub retention_sweep_interval: u64,
    /// JSON asset manifest precached on install
    pub asset_manifest: Option<PathBuf>,
    /// Version string reported by the lifecycle controller
    pub release_version: String,
    /// Per-namespace cache limits
    pub namespaces: Vec<NamespacePolicy>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `UPSTREAM_ORIGIN` - Origin to forward to (default: http://127.0.0.1:3000)
    /// - `DATA_PATH` - SQLite database file (default: offline_relay.db)
    /// - `API_PREFIX` - API path prefix (default: /api/)
    /// - `RETENTION_HOURS` - Queued mutation retention (default: 24)
    /// - `REQUEST_TIMEOUT_SECS` - Upstream timeout (default: 10)
    /// - `PROBE_PATH` - Connectivity probe path (default: /)
    /// - `PROBE_INTERVAL` - Probe frequency in seconds (default: 5)
    /// - `RETENTION_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `ASSET_MANIFEST` - Path to the precache manifest (optional)
    /// - `RELEASE_VERSION` - Version label (default: crate version)
    /// - `<NS>_MAX_ENTRIES`, `<NS>_MAX_AGE_SECS` - Overrides for `PAGES`,
    ///   `ASSETS`, `IMAGES` and `API`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            upstream_origin: env_or("UPSTREAM_ORIGIN", defaults.upstream_origin),
            data_path: env_or("DATA_PATH", defaults.data_path),
            api_prefix: env_or("API_PREFIX", defaults.api_prefix),
            retention_hours: env_or("RETENTION_HOURS", defaults.retention_hours),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            probe_path: env_or("PROBE_PATH", defaults.probe_path),
            probe_interval: env_or("PROBE_INTERVAL", defaults.probe_interval),
            retention_sweep_interval: env_or(
                "RETENTION_SWEEP_INTERVAL",
                defaults.retention_sweep_interval,
            ),
            asset_manifest: env::var("ASSET_MANIFEST").ok().map(PathBuf::from),
            release_version: env_or("RELEASE_VERSION", defaults.release_version),
            namespaces: defaults
                .namespaces
                .into_iter()
                .map(namespace_from_env)
                .collect(),
        }
    }

    /// Parsed upstream origin.
    pub fn origin(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.upstream_origin)
    }

    /// Full probe URL under the upstream origin.
    pub fn probe_url(&self) -> Result<Url, url::ParseError> {
        self.origin()?.join(&self.probe_path)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(Duration::from_secs(
            self.retention_hours.saturating_mul(60 * 60),
        ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Applies `<NAME>_MAX_ENTRIES` and `<NAME>_MAX_AGE_SECS` to a policy.
fn namespace_from_env(mut policy: NamespacePolicy) -> NamespacePolicy {
    let prefix = policy.name.to_ascii_uppercase();

    if let Some(max) = env::var(format!("{prefix}_MAX_ENTRIES"))
        .ok()
        .and_then(|v| v.parse().ok())
    {
        policy = policy.with_max_entries(max);
    }
    if let Some(secs) = env::var(format!("{prefix}_MAX_AGE_SECS"))
        .ok()
        .and_then(|v| v.parse().ok())
    {
        policy = policy.with_max_age(Duration::from_secs(secs));
    }

    policy
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            upstream_origin: "http://127.0.0.1:3000".to_string(),
            data_path: PathBuf::from("offline_relay.db"),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            retention_hours: 24,
            request_timeout_secs: 10,
            probe_path: "/".to_string(),
            probe_interval: 5,
            retention_sweep_interval: 60,
            asset_manifest: None,
            release_version: env!("CARGO_PKG_VERSION").to_string(),
            namespaces: default_policies(),
        }
    }
}
