//! Error types for the gateway.
//!
//! [`GatewayError`] unifies all request-level failure modes into a single
//! enum that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur while serving a gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The target's cooldown window has not elapsed. A policy decision,
    /// not a fault.
    #[error("rate limit exceeded, try again shortly")]
    RateLimited,

    /// The request body or parameters are unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The control plane rejected or failed the mutation.
    #[error("control plane error: {0}")]
    Upstream(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
