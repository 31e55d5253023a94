//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (overall request deadline caps retries + failovers)
//!     → On failure: retries.rs (retry same backend, then fail over)
//! ```
//!
//! # Design Decisions
//! - Every request has a deadline; reaching it ends the request with 503
//! - Fixed retry backoff, no exponential growth
//! - Attempt/retry counters are a plain value owned by the request

pub mod retries;
pub mod timeouts;

pub use retries::{AttemptState, RetryPolicy};
pub use timeouts::Deadline;
