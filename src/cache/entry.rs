//! Cache Entry Module
//!
//! Defines one stored response and its age/expiry checks.

use std::time::Duration;

use crate::models::ResponsePayload;

// == Cache Entry ==
/// A response stored under a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Namespace the entry counts against
    pub namespace: String,
    /// Deterministic key derived from the request
    pub request_key: String,
    /// The stored response
    pub payload: ResponsePayload,
    /// When the response was stored (Unix milliseconds)
    pub stored_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(
        namespace: impl Into<String>,
        request_key: impl Into<String>,
        payload: ResponsePayload,
        stored_at: u64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            request_key: request_key.into(),
            payload,
            stored_at,
        }
    }

    // == Age ==
    /// Milliseconds since the entry was stored, clamped at zero.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at)
    }

    // == Is Expired ==
    /// Checks the entry against a namespace's max age.
    ///
    /// Boundary condition: the entry expires once its age is strictly greater
    /// than `max_age`. An entry read exactly at `stored_at + max_age` is still
    /// fresh. Without a max age the entry never expires.
    pub fn is_expired(&self, max_age: Option<Duration>, now_ms: u64) -> bool {
        match max_age {
            Some(max_age) => u128::from(self.age_ms(now_ms)) > max_age.as_millis(),
            None => false,
        }
    }
}
