//! Request dispatcher: backend selection with retry and failover.
//!
//! # State Machine
//! ```text
//! Dispatching ──select ok──▶ Forwarding ──ok──▶ Succeeded
//!     │  ▲                      │
//!     │  │                      ├─ err, retries < max_retries ─▶ Retrying ─(backoff)─▶ Forwarding
//!     │  │                      │
//!     │  └──── FailingOver ◀────┴─ err, retries == max_retries
//!     │        (mark unreachable, retries = 0, attempts += 1)
//!     │
//!     ├─ attempts > max_attempts ─▶ Exhausted ─▶ 503
//!     └─ no reachable backend ───────────────▶ 503
//!
//! Forwarding ── response over size limit ──▶ 502 (no retry, no failover)
//! ```
//!
//! The whole machine runs under one request deadline; expiry drops the
//! in-flight forward and also ends in 503.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use thiserror::Error;

use crate::http::request::UpstreamRequest;
use crate::load_balancer::{Backend, BackendRegistry, ForwardError};
use crate::observability::metrics;
use crate::resilience::{AttemptState, Deadline, RetryPolicy};

/// Why a request ended without a backend response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    NoAvailableBackend,
    AttemptsExhausted,
    DeadlineExceeded,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::NoAvailableBackend => "no_available_backend",
            UnavailableReason::AttemptsExhausted => "attempts_exhausted",
            UnavailableReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only error that reaches the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(UnavailableReason),

    /// A backend answered but its body was over the configured limit.
    #[error("upstream response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

/// A backend response together with how it was obtained.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response<Body>,
    pub backend: Arc<Backend>,
    pub state: AttemptState,
}

enum Phase {
    Dispatching,
    Forwarding(Arc<Backend>),
    Retrying(Arc<Backend>),
    FailingOver(Arc<Backend>),
}

/// Per-request entry point into the balancer.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    registry: Arc<BackendRegistry>,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<BackendRegistry>, policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            registry,
            policy,
            request_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch a fresh request.
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<Dispatched, DispatchError> {
        self.dispatch_with_state(request, AttemptState::default()).await
    }

    /// Dispatch with explicit counters, e.g. for a request that already
    /// consumed part of its budget elsewhere.
    pub async fn dispatch_with_state(
        &self,
        request: UpstreamRequest,
        state: AttemptState,
    ) -> Result<Dispatched, DispatchError> {
        let deadline = Deadline::after(self.request_timeout);
        match deadline.run(self.drive(&request, state)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    request_id = %request.id(),
                    elapsed = ?deadline.elapsed(),
                    "Request deadline exceeded, giving up"
                );
                Err(self.unavailable(UnavailableReason::DeadlineExceeded))
            }
        }
    }

    async fn drive(&self, request: &UpstreamRequest, mut state: AttemptState) -> Result<Dispatched, DispatchError> {
        let request_id = request.id();
        let mut phase = Phase::Dispatching;

        loop {
            phase = match phase {
                Phase::Dispatching => {
                    if state.exhausted(&self.policy) {
                        tracing::warn!(
                            request_id = %request_id,
                            attempts = state.attempts,
                            "Max attempts reached, terminating"
                        );
                        return Err(self.unavailable(UnavailableReason::AttemptsExhausted));
                    }
                    match self.registry.select() {
                        Ok(backend) => Phase::Forwarding(backend),
                        Err(e) => {
                            tracing::warn!(request_id = %request_id, error = %e, "No backend to dispatch to");
                            return Err(self.unavailable(UnavailableReason::NoAvailableBackend));
                        }
                    }
                }
                Phase::Forwarding(backend) => match backend.forward(request.clone()).await {
                    Ok(response) => {
                        return Ok(Dispatched { response, backend, state });
                    }
                    Err(ForwardError::ResponseTooLarge { limit }) => {
                        tracing::warn!(
                            request_id = %request_id,
                            backend = %backend,
                            limit,
                            "Backend response over size limit, not retrying"
                        );
                        metrics::record_escalation("response_too_large");
                        return Err(DispatchError::ResponseTooLarge { limit });
                    }
                    Err(e) => {
                        tracing::warn!(
                            request_id = %request_id,
                            backend = %backend,
                            error = %e,
                            "Backend forward failed"
                        );
                        if state.can_retry(&self.policy) {
                            Phase::Retrying(backend)
                        } else {
                            Phase::FailingOver(backend)
                        }
                    }
                },
                Phase::Retrying(backend) => {
                    state.record_retry();
                    tracing::info!(
                        request_id = %request_id,
                        backend = %backend,
                        retry = state.retries,
                        delay = ?self.policy.backoff,
                        "Retrying same backend"
                    );
                    metrics::record_escalation("retry");
                    tokio::time::sleep(self.policy.backoff).await;
                    Phase::Forwarding(backend)
                }
                Phase::FailingOver(backend) => {
                    self.registry.mark_state(backend.url(), false);
                    state.record_failover();
                    tracing::info!(
                        request_id = %request_id,
                        backend = %backend,
                        attempt = state.attempts,
                        "Failing over to next backend"
                    );
                    metrics::record_escalation("failover");
                    Phase::Dispatching
                }
            };
        }
    }

    fn unavailable(&self, reason: UnavailableReason) -> DispatchError {
        metrics::record_escalation(reason.as_str());
        DispatchError::ServiceUnavailable(reason)
    }
}
