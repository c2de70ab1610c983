//! Lifecycle Controller
//!
//! Explicit state machine over installing → waiting → active → updating.
//! Every external trigger (install, update, fetch, client message, reconnect)
//! enters through here.

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use url::Url;

use crate::error::{LifecycleError, Result};
use crate::lifecycle::{
    AssetManifest, ClientMessage, ClientNotification, EventOutcome, LifecycleEvent,
    LifecycleState, MessageReply,
};
use crate::models::{ProxyRequest, Served, StatusResponse};
use crate::queue::ReplayReport;
use crate::routing::RouteClassifier;
use crate::strategy::{PrecacheReport, StrategyEngine};

/// Buffered notifications per subscriber before the oldest are dropped.
const NOTIFICATION_CAPACITY: usize = 32;

// == Controller State ==
#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    active_version: Option<String>,
    pending_version: Option<String>,
    clients: usize,
}

impl Inner {
    fn reject(&self, event: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            from: self.state,
            event,
        }
    }

    /// Makes the pending version the active one and returns it.
    fn promote(&mut self) -> String {
        if let Some(version) = self.pending_version.take() {
            self.active_version = Some(version);
        }
        self.state = LifecycleState::Active;
        self.active_version.clone().unwrap_or_default()
    }
}

// == Lifecycle Controller ==
pub struct LifecycleController {
    inner: Mutex<Inner>,
    engine: StrategyEngine,
    classifier: RouteClassifier,
    /// Base for resolving manifest URLs
    origin: Url,
    notifications: broadcast::Sender<ClientNotification>,
}

impl LifecycleController {
    /// Creates a controller in the `installing` state.
    pub fn new(engine: StrategyEngine, classifier: RouteClassifier, origin: Url) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Installing,
                active_version: None,
                pending_version: None,
                clients: 0,
            }),
            engine,
            classifier,
            origin,
            notifications,
        }
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientNotification> {
        self.notifications.subscribe()
    }

    fn notify(&self, notification: ClientNotification) {
        // No subscribers is not an error
        let _ = self.notifications.send(notification);
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    async fn require(&self, expected: LifecycleState, event: &'static str) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.state != expected {
            return Err(inner.reject(event).into());
        }
        Ok(())
    }

    // == Install ==
    /// Precaches the manifest and moves to `waiting`. Precache failures are
    /// counted, never fatal.
    pub async fn install(
        &self,
        version: impl Into<String>,
        manifest: &AssetManifest,
    ) -> Result<PrecacheReport> {
        let version = version.into();
        self.require(LifecycleState::Installing, "install").await?;

        info!(
            "Installing version {} ({} manifest entries)",
            version,
            manifest.len()
        );
        let report = self.engine.precache(manifest, &self.origin).await;

        let mut inner = self.inner.lock().await;
        if inner.state != LifecycleState::Installing {
            return Err(inner.reject("install").into());
        }
        inner.pending_version = Some(version);
        inner.state = LifecycleState::Waiting;

        Ok(report)
    }

    // == Activate ==
    /// Takes control of every connected client. From `updating` this is only
    /// allowed once no client is attached to the old version.
    pub async fn activate(&self) -> Result<String> {
        let version = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                LifecycleState::Waiting => {}
                LifecycleState::Updating if inner.clients == 0 => {}
                LifecycleState::Updating => {
                    return Err(LifecycleError::WaitingOnClients {
                        clients: inner.clients,
                    }
                    .into())
                }
                _ => return Err(inner.reject("activate").into()),
            }

            let clients = inner.clients;
            let version = inner.promote();
            info!("Activated version {} for {} client(s)", version, clients);
            version
        };

        self.notify(ClientNotification::Activated {
            version: version.clone(),
        });
        Ok(version)
    }

    // == Update ==
    /// Stages a new version while the current one keeps serving. Activates
    /// straight away when no client is connected.
    ///
    /// Returns the precache report and whether the new version is already active.
    pub async fn begin_update(
        &self,
        version: impl Into<String>,
        manifest: &AssetManifest,
    ) -> Result<(PrecacheReport, bool)> {
        let version = version.into();
        self.require(LifecycleState::Active, "update").await?;

        info!("Staging version {}", version);
        let report = self.engine.precache(manifest, &self.origin).await;

        let activated = {
            let mut inner = self.inner.lock().await;
            if inner.state != LifecycleState::Active {
                return Err(inner.reject("update").into());
            }
            inner.state = LifecycleState::Updating;
            inner.pending_version = Some(version.clone());

            (inner.clients == 0).then(|| inner.promote())
        };

        self.notify(ClientNotification::NewVersionReady { version });
        if let Some(version) = &activated {
            info!("No clients attached; activated {} immediately", version);
            self.notify(ClientNotification::Activated {
                version: version.clone(),
            });
        }

        Ok((report, activated.is_some()))
    }

    // == Clients ==
    pub async fn client_connected(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.clients += 1;
        inner.clients
    }

    /// The last client leaving during an update completes the activation.
    pub async fn client_disconnected(&self) -> usize {
        let (clients, activated) = {
            let mut inner = self.inner.lock().await;
            inner.clients = inner.clients.saturating_sub(1);

            let activated = (inner.clients == 0 && inner.state == LifecycleState::Updating)
                .then(|| inner.promote());
            (inner.clients, activated)
        };

        if let Some(version) = activated {
            info!("Last client left; activated {}", version);
            self.notify(ClientNotification::Activated { version });
        }
        clients
    }

    // == Fetch ==
    /// Intercepts a request once a version is in control; before that every
    /// request is forwarded untouched.
    pub async fn fetch(&self, req: &ProxyRequest) -> Result<Served> {
        if !self.state().await.is_controlling() {
            debug!("Not controlling yet; forwarding {} {}", req.method, req.url);
            return self.engine.passthrough(req).await;
        }

        let route = self.classifier.classify(req);
        debug!("{} {} -> {}", req.method, req.url, route.strategy);
        self.engine.handle(req, route).await
    }

    // == Messages ==
    pub async fn handle_message(&self, message: ClientMessage) -> Result<MessageReply> {
        match message {
            ClientMessage::ActivateNow => {
                let activated = {
                    let mut inner = self.inner.lock().await;
                    match inner.state {
                        LifecycleState::Active => None,
                        LifecycleState::Waiting | LifecycleState::Updating => {
                            Some(inner.promote())
                        }
                        LifecycleState::Installing => {
                            return Err(inner.reject("ACTIVATE_NOW").into())
                        }
                    }
                };

                if let Some(version) = activated {
                    info!("Skip-waiting requested; activated {}", version);
                    self.notify(ClientNotification::Activated { version });
                }
                Ok(MessageReply::Ack {
                    state: LifecycleState::Active,
                })
            }
            ClientMessage::PendingSyncCount => Ok(MessageReply::PendingSyncCount {
                count: self.engine.queue().pending().await?,
            }),
        }
    }

    // == Reconnect ==
    /// Replays the queue and tells clients how it went.
    pub async fn reconnect(&self) -> Result<ReplayReport> {
        let report = self.engine.queue().replay_all().await?;

        self.notify(ClientNotification::SyncCompleted {
            succeeded: report.succeeded(),
            failed: report.failed(),
            expired: report.expired(),
            pending: report.remaining,
        });
        Ok(report)
    }

    // == Status ==
    pub async fn status(&self) -> Result<StatusResponse> {
        let pending_sync = self.engine.queue().pending().await?;
        let namespaces = self.engine.cache().read().await.stats();
        let inner = self.inner.lock().await;

        Ok(StatusResponse {
            state: inner.state,
            active_version: inner.active_version.clone(),
            pending_version: inner.pending_version.clone(),
            clients: inner.clients,
            pending_sync,
            namespaces,
        })
    }

    // == Dispatch ==
    /// Routes an event to its handler.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome> {
        debug!("Dispatching '{}' event", event.name());

        match event {
            LifecycleEvent::Install { version, manifest } => {
                Ok(EventOutcome::Installed(self.install(version, &manifest).await?))
            }
            LifecycleEvent::Update { version, manifest } => {
                let (precache, activated) = self.begin_update(version, &manifest).await?;
                Ok(EventOutcome::UpdateStaged {
                    precache,
                    activated,
                })
            }
            LifecycleEvent::Activate => Ok(EventOutcome::Activated {
                version: self.activate().await?,
            }),
            LifecycleEvent::Fetch(req) => Ok(EventOutcome::Response(self.fetch(&req).await?)),
            LifecycleEvent::Message(message) => {
                Ok(EventOutcome::Reply(self.handle_message(message).await?))
            }
            LifecycleEvent::Reconnect => Ok(EventOutcome::Replayed(self.reconnect().await?)),
            LifecycleEvent::ClientConnected => {
                Ok(EventOutcome::Clients(self.client_connected().await))
            }
            LifecycleEvent::ClientDisconnected => {
                Ok(EventOutcome::Clients(self.client_disconnected().await))
            }
        }
    }
}
