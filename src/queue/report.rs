//! Replay Report Module
//!
//! What one replay pass did to each queued request.

use serde::Serialize;

use crate::queue::QueuedRequest;

// == Replay Status ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplayStatus {
    /// Delivered and removed from the queue
    Succeeded { status: u16 },
    /// Transport failure; the entry stays queued and the pass stops here
    Failed { error: String },
    /// Aged past the retention window; dropped without being sent
    Expired,
    /// Could not be rebuilt into a request; dropped without being sent
    Discarded { error: String },
}

// == Replay Outcome ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub attempt_count: u32,
    #[serde(flatten)]
    pub status: ReplayStatus,
}

impl ReplayOutcome {
    pub fn new(entry: &QueuedRequest, status: ReplayStatus) -> Self {
        Self {
            id: entry.id,
            method: entry.method.clone(),
            url: entry.url.clone(),
            attempt_count: entry.attempt_count,
            status,
        }
    }
}

// == Replay Report ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// RFC 3339
    pub started_at: String,
    /// In replay order
    pub outcomes: Vec<ReplayOutcome>,
    /// True when a failure stopped the pass before the end of the queue
    pub halted: bool,
    /// Entries still queued after the pass
    pub remaining: usize,
}

impl ReplayReport {
    pub fn new(started_at: impl Into<String>) -> Self {
        Self {
            started_at: started_at.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, outcome: ReplayOutcome) {
        self.outcomes.push(outcome);
    }

    fn count(&self, pred: impl Fn(&ReplayStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, ReplayStatus::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ReplayStatus::Failed { .. }))
    }

    /// Permanently lost: expired plus discarded.
    pub fn expired(&self) -> usize {
        self.count(|s| matches!(s, ReplayStatus::Expired | ReplayStatus::Discarded { .. }))
    }

    /// Ids in the order they were processed.
    pub fn ids(&self) -> Vec<i64> {
        self.outcomes.iter().map(|o| o.id).collect()
    }
}
