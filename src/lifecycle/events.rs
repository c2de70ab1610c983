//! Lifecycle events and what handling them produced.

use crate::lifecycle::{AssetManifest, ClientMessage, MessageReply};
use crate::models::{ProxyRequest, Served};
use crate::queue::ReplayReport;
use crate::strategy::PrecacheReport;

// == Events ==
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install {
        version: String,
        manifest: AssetManifest,
    },
    Update {
        version: String,
        manifest: AssetManifest,
    },
    Activate,
    Fetch(ProxyRequest),
    Message(ClientMessage),
    Reconnect,
    ClientConnected,
    ClientDisconnected,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Update { .. } => "update",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
            Self::Message(_) => "message",
            Self::Reconnect => "reconnect",
            Self::ClientConnected => "client_connected",
            Self::ClientDisconnected => "client_disconnected",
        }
    }
}

// == Outcomes ==
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(PrecacheReport),
    /// The new version is staged; `activated` is set when no client held it back
    UpdateStaged {
        precache: PrecacheReport,
        activated: bool,
    },
    Activated { version: String },
    Response(Served),
    Reply(MessageReply),
    Replayed(ReplayReport),
    /// Clients connected after the event
    Clients(usize),
}
