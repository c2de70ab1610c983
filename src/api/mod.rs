//! API Module
//!
//! HTTP surface of the relay: the intercepting fallback and the control endpoints.
//!
//! # Endpoints
//! - `POST /__offline/message` - Client message protocol
//! - `POST /__offline/reconnect` - Reconnect signal
//! - `GET /__offline/status` - Relay status
//! - `POST|DELETE /__offline/clients` - Client registry
//! - `GET /__offline/health` - Health check endpoint
//! - everything else - Intercepted request

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
