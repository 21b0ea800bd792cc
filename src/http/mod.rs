//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (request id, trace span, timeout, body limit)
//!     → middleware/metrics.rs (per-route counters and latency)
//!     → admin (session check, role check, handler)
//!     → AdminError / JSON response
//! ```

pub mod middleware;
pub mod server;

pub use server::{AdminServer, AppState, ServerError};
