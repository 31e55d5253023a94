//! Load balancer error types.

use thiserror::Error;
use url::Url;

/// Errors raised by the backend registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadBalancerError {
    /// Pool is empty or every backend is marked unreachable.
    #[error("no available backend")]
    NoAvailableBackend,

    /// A backend with the same address is already registered.
    #[error("backend {0} is already registered")]
    DuplicateBackend(Url),
}

/// Failure while relaying a request to a backend.
///
/// Transport and body errors are recovered by the dispatcher through retry and
/// failover. `ResponseTooLarge` means the backend answered, so it ends the
/// request without touching the backend's liveness.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The outbound request could not be built.
    #[error("invalid upstream request: {0}")]
    Request(String),

    /// Connecting to or talking to the backend failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend response body could not be read to completion.
    #[error("response body error: {0}")]
    Body(String),

    /// The backend answered with more than `limit` bytes of body.
    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl ForwardError {
    /// Whether the backend itself is suspect and the request may go elsewhere.
    pub fn is_transport(&self) -> bool {
        !matches!(self, ForwardError::ResponseTooLarge { .. })
    }
}
