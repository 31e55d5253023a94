//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered backend
//! - Update backend liveness based on results

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use url::Url;

use crate::config::HealthCheckConfig;
use crate::load_balancer::BackendRegistry;
use crate::observability::metrics;
use crate::resilience::timeouts::instant_after;

/// Why a connectivity probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("backend URL has no host or port")]
    NoAuthority,

    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of probing one backend during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub url: Url,
    pub up: bool,
}

/// Periodic TCP liveness prober.
pub struct HealthProbe {
    registry: Arc<BackendRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(registry: Arc<BackendRegistry>, config: &HealthCheckConfig) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Override the cadence (tests use sub-second values).
    pub fn with_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    /// Start the probe loop as its own task. Abort the handle or fire
    /// `shutdown` to stop it.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            timeout = ?self.timeout,
            "Health probe starting"
        );

        // First tick after one full interval; backends start out reachable.
        let mut ticker = time::interval_at(instant_after(Instant::now(), self.interval), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Starting health check");
                    self.check_all().await;
                    tracing::debug!("Health check completed");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health probe received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend once, concurrently, and record the results.
    pub async fn check_all(&self) -> Vec<ProbeOutcome> {
        let backends = self.registry.all_backends();
        let timeout = self.timeout;

        let probes = backends.into_iter().map(|backend| async move {
            let result = probe(backend.authority(), timeout).await;
            (backend, result)
        });

        let mut outcomes = Vec::new();
        for (backend, result) in join_all(probes).await {
            let up = match result {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(backend = %backend, error = %e, "Backend unreachable");
                    false
                }
            };
            let status = if up { "up" } else { "down" };
            tracing::info!(backend = %backend, status, "Backend {} is {}", backend, status);

            // A backend removed mid-tick is simply not updated.
            self.registry.mark_state(backend.url(), up);
            metrics::record_backend_health(backend.url().as_str(), up);

            outcomes.push(ProbeOutcome {
                url: backend.url().clone(),
                up,
            });
        }
        outcomes
    }
}

/// Open a TCP connection to `authority` and close it immediately.
pub async fn probe(authority: Option<String>, timeout: Duration) -> Result<(), ProbeError> {
    let authority = authority.ok_or(ProbeError::NoAuthority)?;
    match time::timeout(timeout, TcpStream::connect(authority.as_str())).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}
