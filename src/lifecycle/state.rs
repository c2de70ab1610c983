use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the relay is in its install/activate/update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Precaching the first manifest; nothing is intercepted yet
    Installing,
    /// Installed, not yet in control
    Waiting,
    /// Intercepting requests for the active version
    Active,
    /// Active version still serving while a new one waits for clients to leave
    Updating,
}

impl LifecycleState {
    /// True once a version controls requests.
    pub fn is_controlling(&self) -> bool {
        matches!(self, Self::Active | Self::Updating)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Updating => write!(f, "updating"),
        }
    }
}
