//! API Routes
//!
//! Configures the Axum router: control endpoints under `/__offline`, every
//! other path intercepted.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    client_connect_handler, client_disconnect_handler, health_handler, message_handler,
    proxy_handler, reconnect_handler, status_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /__offline/message` - Client message protocol
/// - `POST /__offline/reconnect` - Reconnect signal; replays the queue
/// - `GET /__offline/status` - Lifecycle state, pending sync and cache statistics
/// - `POST|DELETE /__offline/clients` - Client registry
/// - `GET /__offline/health` - Health check endpoint
/// - anything else - Intercepted and forwarded to the upstream origin
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__offline/message", post(message_handler))
        .route("/__offline/reconnect", post(reconnect_handler))
        .route("/__offline/status", get(status_handler))
        .route(
            "/__offline/clients",
            post(client_connect_handler).delete(client_disconnect_handler),
        )
        .route("/__offline/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
