//! Timeout enforcement.
//!
//! # Responsibilities
//! - Cap the wall-clock time of one logical request across all retries and failovers
//! - Cancel in-flight forwarding cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the future cancels the I/O
//! - A missed deadline is reported as its own outcome, distinct from transport errors

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, error::Elapsed, Instant};

/// Cap for deadlines that would overflow the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `from + budget`, saturating at a far-future instant instead of panicking.
pub fn instant_after(from: Instant, budget: Duration) -> Instant {
    from.checked_add(budget)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Absolute deadline for one request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self { started, at: instant_after(started, budget) }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Run `future` to completion or until the deadline, whichever comes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Elapsed> {
        time::timeout_at(self.at, future).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let out = deadline.run(async { 7 }).await;
        assert_eq!(out.unwrap(), 7);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_huge_budget_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(86_400 * 365));
        assert_eq!(deadline.run(async { 1 }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancels_at_deadline() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let out = deadline.run(std::future::pending::<()>()).await;
        assert!(out.is_err());
        assert!(deadline.is_expired());
        assert!(deadline.elapsed() >= Duration::from_millis(20));
    }
}
