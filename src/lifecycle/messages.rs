//! Foreground/background message protocol
//!
//! Messages are JSON objects tagged by `type`, e.g. `{"type":"ACTIVATE_NOW"}`.

use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;

// == Inbound ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Skip waiting and take control now
    ActivateNow,
    /// How many mutations are waiting to sync
    PendingSyncCount,
}

// == Replies ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
    Ack { state: LifecycleState },
    PendingSyncCount { count: usize },
}

// == Broadcast ==
/// Pushed to every subscribed client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientNotification {
    NewVersionReady {
        version: String,
    },
    Activated {
        version: String,
    },
    SyncCompleted {
        succeeded: usize,
        failed: usize,
        expired: usize,
        pending: usize,
    },
}
