//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives at the dispatcher
//!     → pool.rs (BackendRegistry::select under the pool lock)
//!     → round_robin.rs (scan from cursor to the next reachable backend)
//!     → backend.rs (forward through the backend's forwarding capability)
//!     → Return response or ForwardError
//!
//! Liveness updates:
//!     health probe / dispatcher failover
//!     → pool.rs (BackendRegistry::mark_state)
//!     → backend.rs (atomic reachable flag)
//! ```
//!
//! # Design Decisions
//! - One lock covers the sequence and the cursor
//! - Liveness is a per-backend atomic, read without the pool lock
//! - Unreachable backends are skipped, never returned
//! - Insertion order is rotation order

pub mod backend;
pub mod error;
pub mod pool;
pub mod round_robin;

pub use backend::{Backend, Forward};
pub use error::{ForwardError, LoadBalancerError};
pub use pool::BackendRegistry;
