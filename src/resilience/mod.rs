//! Resilience primitives for outbound gateway pushes.
//!
//! # Data Flow
//! ```text
//! Push to one target:
//!     → retries.rs (attempt budget, per-attempt deadline, cancellation)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Every attempt has its own deadline; a hung target cannot stall a release
//! - Cancellation is observed both while waiting and while an attempt runs

pub mod backoff;
pub mod retries;

pub use backoff::{calculate_backoff, BackoffPolicy};
pub use retries::{retry, AttemptEnd, RetryPolicy, Retried};
