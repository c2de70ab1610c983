//! Lifecycle Module
//!
//! Install, activate and update state machine; owns the fetch hook, the
//! message protocol and the reconnect trigger.

mod controller;
mod events;
mod manifest;
mod messages;
mod state;

pub use controller::LifecycleController;
pub use events::{EventOutcome, LifecycleEvent};
pub use manifest::{AssetManifest, ManifestEntry};
pub use messages::{ClientMessage, ClientNotification, MessageReply};
pub use state::LifecycleState;
