//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, body limit)
//!     → request.rs (buffer body, strip hop-by-hop headers)
//!     → dispatcher.rs (select backend, retry, fail over)
//!     → forwarder.rs (send to backend, buffer response)
//!     → response.rs (503 mapping)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchError, RequestDispatcher, UnavailableReason};
pub use request::{MakeRequestUuid, UpstreamRequest, X_REQUEST_ID};
pub use server::HttpServer;
