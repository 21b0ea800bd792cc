//! Gateway Admin Control Plane Library
//!
//! Draft/published configuration store, release coordinator and the
//! administrative HTTP API for a fleet of reverse-proxy gateways.

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod net;
pub mod observability;
pub mod release;
pub mod resilience;
pub mod store;

pub use config::schema::AdminConfig;
pub use error::{AdminError, AdminResult};
pub use http::AdminServer;
pub use lifecycle::Shutdown;
