//! Request and response models
//!
//! The intercepted request/response shapes shared by every component, and the
//! DTOs serialized by the control API.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{Destination, ProxyRequest, RequestMode};
pub use responses::{
    ClientsResponse, HealthResponse, ResponsePayload, ResponseSource, Served, StatusResponse,
    QUEUED_HEADER, SOURCE_HEADER,
};
