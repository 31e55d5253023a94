//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probe (active.rs):
//!     Periodic timer
//!     → TCP connect to each backend (bounded per probe)
//!     → BackendRegistry::mark_state
//!
//! Passive detection (http::dispatcher):
//!     Forward keeps failing after retries
//!     → BackendRegistry::mark_state(unreachable)
//!     → next probe tick may resurrect it
//! ```
//!
//! # Design Decisions
//! - Probe outcome flips state directly, no thresholds
//! - Probe failures only change liveness, never fail a request
//! - Health state is per-backend, not per-pool

pub mod active;

pub use active::{HealthProbe, ProbeOutcome};
