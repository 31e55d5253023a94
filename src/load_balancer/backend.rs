//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server identified by its URL
//! - Track liveness (reachable / unreachable)
//! - Own the forwarding capability used to relay requests to it

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use futures_util::future::BoxFuture;
use url::Url;

use crate::http::request::UpstreamRequest;
use crate::load_balancer::error::ForwardError;

/// Capability to relay one request to one upstream address.
///
/// Implementations may block on network I/O. Deadlines are imposed by the
/// caller, which drops the returned future when time runs out.
pub trait Forward: Send + Sync + fmt::Debug {
    fn forward(&self, request: UpstreamRequest) -> BoxFuture<'_, Result<Response<Body>, ForwardError>>;
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// The address of the backend.
    url: Url,
    /// Last known liveness.
    reachable: AtomicBool,
    forwarder: Arc<dyn Forward>,
}

impl Backend {
    /// Create a new backend. Backends start out reachable.
    pub fn new(url: Url, forwarder: Arc<dyn Forward>) -> Self {
        Self {
            url,
            reachable: AtomicBool::new(true),
            forwarder,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` used for connectivity probes.
    pub fn authority(&self) -> Option<String> {
        let host = self.url.host_str()?;
        let port = self.url.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }

    /// Point-in-time read of the liveness flag.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Update the liveness flag. Returns the previous value.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        self.reachable.swap(reachable, Ordering::AcqRel)
    }

    /// Relay a request through this backend's forwarding capability.
    pub async fn forward(&self, request: UpstreamRequest) -> Result<Response<Body>, ForwardError> {
        self.forwarder.forward(request).await
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
