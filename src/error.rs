//! Error types for the offline relay
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StorageError;
use crate::lifecycle::LifecycleState;

// == Proxy Error Enum ==
/// Unified error type for the offline relay.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Both the network and every usable cache entry were exhausted
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A mutation could not be written to the replay queue and was not queued
    #[error("Request was not queued: {0}")]
    QueuePersistence(String),

    /// The durable store failed outside of an enqueue
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected lifecycle transition
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ProxyError {
    fn from(err: StorageError) -> Self {
        ProxyError::Storage(err.to_string())
    }
}

// == Lifecycle Error Enum ==
/// Errors raised by the lifecycle state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The event is not accepted in the current state
    #[error("Cannot handle '{event}' while {from}")]
    InvalidTransition {
        from: LifecycleState,
        event: &'static str,
    },

    /// Activation of a new version is blocked by connected clients
    #[error("Activation deferred: {clients} client(s) still attached to the previous version")]
    WaitingOnClients { clients: usize },
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::NetworkUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::QueuePersistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Lifecycle(_) => StatusCode::CONFLICT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the offline relay.
pub type Result<T> = std::result::Result<T, ProxyError>;
