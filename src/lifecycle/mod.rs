//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → HTTP server stops accepting, drains in-flight requests
//!               → config reload loop exits
//! ```
//!
//! # Design Decisions
//! - In-flight releases are not aborted by shutdown; the server waits for
//!   their handlers to finish while draining

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
