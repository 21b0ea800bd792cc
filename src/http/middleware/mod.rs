//! Cross-cutting request middleware.

pub mod metrics;

pub use metrics::track_metrics;
