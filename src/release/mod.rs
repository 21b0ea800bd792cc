//! Release coordinator: moves a consistent draft snapshot to the gateway
//! fleet and into the published tier.
//!
//! # Data Flow
//! ```text
//! publish command
//!     → coordinator.rs (single-flight state machine)
//!     → validate.rs (referential closure, pure)
//!     → plan.rs (ordered upsert / prune stages)
//!     → push.rs (GatewayPush per target, fan-out)
//!     → report.rs (per-target outcomes, terminal state)
//!     → ConfigStore::commit_published on unanimous Applied
//! ```

pub mod coordinator;
pub mod plan;
pub mod push;
pub mod report;
pub mod targets;
pub mod validate;

pub use coordinator::{ReleaseCoordinator, ReleaseSettings};
pub use plan::{PushBatch, PushStage};
pub use push::{GatewayPush, GatewayTarget, HttpGatewayPush, PushOutcome};
pub use report::{
    ActiveReleaseView, CompensationReport, ReleasePhase, ReleaseReport, ReleaseState,
    ReleaseStatus, TargetReport,
};
pub use targets::TargetRegistry;
pub use validate::{validate_snapshot, ReferenceViolation};
