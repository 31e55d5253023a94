//! Retry and failover bookkeeping.
//!
//! # Responsibilities
//! - Hold the retry policy (same-backend retries, distinct-backend attempts, backoff)
//! - Track per-request attempt/retry counters
//!
//! A failed forward is retried on the same backend while `retries < max_retries`.
//! After that the backend is failed over: `retries` resets and `attempts` grows.
//! A request whose `attempts` exceeds `max_attempts` is exhausted.

use std::time::Duration;
use crate::config::RetryConfig;

/// Limits applied by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Same-backend retries before failing over.
    pub max_retries: u32,
    /// Distinct backends tried per request.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_attempts: config.max_attempts,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Per-request counters, created at first dispatch and dropped when the request ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    /// Distinct backends tried so far, starting at 1.
    pub attempts: u32,
    /// Retries against the current backend.
    pub retries: u32,
}

impl Default for AttemptState {
    fn default() -> Self {
        Self { attempts: 1, retries: 0 }
    }
}

impl AttemptState {
    pub fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts > policy.max_attempts
    }

    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        self.retries < policy.max_retries
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Move on to a new backend.
    pub fn record_failover(&mut self) {
        self.retries = 0;
        self.attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_millis(10));

        let state = AttemptState::default();
        assert_eq!((state.attempts, state.retries), (1, 0));
    }

    #[test]
    fn test_escalation_sequence() {
        let policy = RetryPolicy::default();
        let mut state = AttemptState::default();

        for _ in 0..3 {
            assert!(state.can_retry(&policy));
            state.record_retry();
        }
        assert!(!state.can_retry(&policy));

        state.record_failover();
        assert_eq!(state, AttemptState { attempts: 2, retries: 0 });
        assert!(!state.exhausted(&policy));

        state.record_failover();
        assert!(!state.exhausted(&policy));
        state.record_failover();
        assert!(state.exhausted(&policy));
    }
}
