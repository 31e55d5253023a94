//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map dispatcher outcomes to HTTP responses
//! - Propagate the request id back to the client
//!
//! # Design Decisions
//! - Backend responses are returned unchanged (already buffered by the forwarder)
//! - Every terminal failure is a 503 with a fixed body; the reason goes to logs and metrics only
//! - An oversized backend response is a 502, since the backend did answer

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::dispatcher::DispatchError;

/// Body sent with every 503.
pub const SERVICE_UNAVAILABLE_BODY: &str = "Service not available";

/// Body sent when a backend response is over the size limit.
pub const RESPONSE_TOO_LARGE_BODY: &str = "Upstream response too large";

pub fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        SERVICE_UNAVAILABLE_BODY,
    )
        .into_response()
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::ServiceUnavailable(_) => service_unavailable(),
            DispatchError::ResponseTooLarge { .. } => (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
                RESPONSE_TOO_LARGE_BODY,
            )
                .into_response(),
        }
    }
}
