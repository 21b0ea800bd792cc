//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! server.bind_address
//!     → listener.rs (parse, bind, log the resolved address)
//!     → tls.rs (optional rustls config for axum-server)
//!     → Hand off to HTTP layer
//! ```

pub mod listener;
pub mod tls;

pub use listener::{bind, ListenerError};
pub use tls::load_tls_config;
