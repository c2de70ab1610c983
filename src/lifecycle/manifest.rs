//! Asset manifest
//!
//! A build-time list of `{url, revision}` pairs precached on install.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::db::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Absolute, or relative to the upstream origin
    pub url: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl ManifestEntry {
    pub fn new(url: impl Into<String>, revision: Option<&str>) -> Self {
        Self {
            url: url.into(),
            revision: revision.map(str::to_string),
        }
    }
}

// == Asset Manifest ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: Vec<ManifestEntry>,
}

impl AssetManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a JSON array of entries from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json(&raw)?)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every entry against `origin`. Unparseable URLs are skipped.
    pub fn resolve(&self, origin: &Url) -> Vec<(Url, Option<String>)> {
        self.entries
            .iter()
            .filter_map(|entry| match origin.join(&entry.url) {
                Ok(url) => Some((url, entry.revision.clone())),
                Err(e) => {
                    warn!("Skipping manifest entry '{}': {}", entry.url, e);
                    None
                }
            })
            .collect()
    }
}
