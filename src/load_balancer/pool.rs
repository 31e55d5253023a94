//! Backend registry.
//!
//! # Responsibilities
//! - Own the ordered set of backends (insertion order is rotation order)
//! - Select the next reachable backend in round-robin order
//! - Apply liveness updates from the health probe and the dispatcher
//! - Admit and evict backends at runtime (admin API, config reload)
//!
//! Every read of the cursor and every mutation of the sequence happens under
//! one lock. The lock is never held across I/O or an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use crate::load_balancer::{
    backend::Backend,
    error::LoadBalancerError,
    round_robin::RoundRobin,
};

#[derive(Debug, Default)]
struct Pool {
    backends: Vec<Arc<Backend>>,
    rotation: RoundRobin,
}

/// Shared registry of upstream backends.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    pool: Mutex<Pool>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from backends in rotation order. Duplicates are skipped.
    pub fn with_backends(backends: impl IntoIterator<Item = Arc<Backend>>) -> Self {
        let registry = Self::new();
        for backend in backends {
            if let Err(e) = registry.add(backend) {
                tracing::warn!(error = %e, "Skipping backend");
            }
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        // Pool state stays consistent even if a holder panicked.
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a backend to the end of the rotation.
    pub fn add(&self, backend: Arc<Backend>) -> Result<(), LoadBalancerError> {
        let mut pool = self.lock();
        if pool.backends.iter().any(|b| b.url() == backend.url()) {
            return Err(LoadBalancerError::DuplicateBackend(backend.url().clone()));
        }
        tracing::info!(backend = %backend, position = pool.backends.len(), "Backend added");
        pool.backends.push(backend);
        Ok(())
    }

    /// Remove the first backend matching `url`. Returns false if none matched.
    pub fn remove(&self, url: &Url) -> bool {
        let mut pool = self.lock();
        let Some(index) = pool.backends.iter().position(|b| b.url() == url) else {
            return false;
        };
        pool.backends.remove(index);
        let new_len = pool.backends.len();
        pool.rotation.on_removed(index, new_len);
        tracing::info!(backend = %url, remaining = new_len, "Backend removed");
        true
    }

    /// Pick the next reachable backend in rotation order.
    pub fn select(&self) -> Result<Arc<Backend>, LoadBalancerError> {
        let mut pool = self.lock();
        let Pool { backends, rotation } = &mut *pool;
        match rotation.next_server(backends) {
            Some(backend) => Ok(backend),
            None => {
                tracing::debug!(backend_count = backends.len(), "No reachable backend in pool");
                Err(LoadBalancerError::NoAvailableBackend)
            }
        }
    }

    /// Set the liveness flag of the backend matching `url`.
    /// Returns false if the address is unknown.
    pub fn mark_state(&self, url: &Url, reachable: bool) -> bool {
        let backend = {
            let pool = self.lock();
            pool.backends.iter().find(|b| b.url() == url).cloned()
        };
        match backend {
            Some(backend) => {
                let previous = backend.set_reachable(reachable);
                if previous != reachable {
                    tracing::info!(backend = %url, reachable, "Backend state changed");
                }
                true
            }
            None => false,
        }
    }

    /// Snapshot of all backends in rotation order.
    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.lock().backends.clone()
    }

    pub fn addresses(&self) -> Vec<Url> {
        self.lock().backends.iter().map(|b| b.url().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cursor(&self) -> usize {
        self.lock().rotation.cursor()
    }

    /// Reconcile the pool with a new address list.
    ///
    /// The pool becomes exactly `urls`, in that order. Surviving backends keep
    /// their liveness state, new ones come from `make_backend`, repeated URLs
    /// are kept once. The cursor keeps pointing at the same next backend when
    /// it survives. `make_backend` runs under the pool lock and must not block.
    pub fn sync_addresses<F>(&self, urls: &[Url], make_backend: F)
    where
        F: Fn(&Url) -> Arc<Backend>,
    {
        let mut pool = self.lock();
        let Pool { backends, rotation } = &mut *pool;
        let next = backends.get(rotation.cursor()).map(|b| b.url().clone());

        let mut synced: Vec<Arc<Backend>> = Vec::with_capacity(urls.len());
        for url in urls {
            if synced.iter().any(|b| b.url() == url) {
                continue;
            }
            let backend = match backends.iter().find(|b| b.url() == url) {
                Some(existing) => existing.clone(),
                None => {
                    let backend = make_backend(url);
                    tracing::info!(backend = %backend, position = synced.len(), "Backend added");
                    backend
                }
            };
            synced.push(backend);
        }
        for gone in backends.iter().filter(|b| !urls.contains(b.url())) {
            tracing::info!(backend = %gone, "Backend removed");
        }

        let cursor = next
            .and_then(|url| synced.iter().position(|b| b.url() == &url))
            .unwrap_or(rotation.cursor());
        *backends = synced;
        rotation.point_at(cursor, backends.len());
    }
}
