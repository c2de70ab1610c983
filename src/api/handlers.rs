//! API Handlers
//!
//! The intercepting fallback handler plus the control endpoints under `/__offline`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::Response,
    Json,
};
use tracing::debug;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::lifecycle::{ClientMessage, LifecycleController, MessageReply};
use crate::models::{
    ClientsResponse, HealthResponse, ProxyRequest, Served, StatusResponse, SOURCE_HEADER,
};
use crate::queue::ReplayReport;
use crate::strategy::is_hop_by_hop;

/// Largest request body accepted for forwarding or queueing.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<LifecycleController>,
    /// Origin intercepted paths are resolved against
    pub origin: Url,
}

impl AppState {
    pub fn new(controller: Arc<LifecycleController>, origin: Url) -> Self {
        Self { controller, origin }
    }
}

// == Conversions ==
/// Rebuilds an inbound axum request as an upstream request under `origin`.
async fn to_proxy_request(origin: &Url, req: Request) -> Result<ProxyRequest> {
    let (parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = origin
        .join(path)
        .map_err(|e| ProxyError::InvalidRequest(format!("bad path '{path}': {e}")))?;

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("unreadable body: {e}")))?;

    Ok(ProxyRequest::from_parts(
        parts.method,
        url,
        headers,
        body.to_vec(),
    ))
}

fn to_response(served: Served) -> Result<Response> {
    let Served { payload, source } = served;

    let status = StatusCode::from_u16(payload.status)
        .map_err(|e| ProxyError::Internal(format!("upstream status: {e}")))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in &payload.headers {
        if !is_hop_by_hop(name) && name != SOURCE_HEADER {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    builder
        .header(SOURCE_HEADER, source.as_str())
        .body(Body::from(payload.body))
        .map_err(|e| ProxyError::Internal(e.to_string()))
}

// == Handlers ==
/// Fallback for every path outside `/__offline`: the fetch hook.
pub async fn proxy_handler(State(state): State<AppState>, req: Request) -> Result<Response> {
    let req = to_proxy_request(&state.origin, req).await?;
    let served = state.controller.fetch(&req).await?;

    debug!(
        "{} {} served from {}",
        req.method,
        req.url,
        served.source.as_str()
    );
    to_response(served)
}

/// Handler for POST /__offline/message
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<ClientMessage>,
) -> Result<Json<MessageReply>> {
    Ok(Json(state.controller.handle_message(message).await?))
}

/// Handler for POST /__offline/reconnect
pub async fn reconnect_handler(State(state): State<AppState>) -> Result<Json<ReplayReport>> {
    Ok(Json(state.controller.reconnect().await?))
}

/// Handler for GET /__offline/status
pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(state.controller.status().await?))
}

/// Handler for POST /__offline/clients
pub async fn client_connect_handler(State(state): State<AppState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state.controller.client_connected().await,
    })
}

/// Handler for DELETE /__offline/clients
pub async fn client_disconnect_handler(State(state): State<AppState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state.controller.client_disconnected().await,
    })
}

/// Handler for GET /__offline/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
