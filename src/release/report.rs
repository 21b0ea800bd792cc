//! Release reports and status views.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::push::PushOutcome;
use super::validate::ReferenceViolation;
use crate::model::ReleaseScope;

/// Non-terminal phases of an in-flight release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePhase {
    Requested,
    Snapshotting,
    Validating,
    Pushing,
    Aggregating,
    Committing,
}

/// Terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    Committed,
    Rejected,
    Failed,
    Cancelled,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Committed => "committed",
            ReleaseState::Rejected => "rejected",
            ReleaseState::Failed => "failed",
            ReleaseState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of pushing to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: PushOutcome,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Re-push of the previous published snapshot after a failed release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationReport {
    pub restored_version: u64,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub release_id: Uuid,
    pub scope: ReleaseScope,
    pub state: ReleaseState,
    pub requested_by: String,
    /// Draft revision the release snapshotted, if it got that far.
    pub draft_revision: Option<u64>,
    /// Version committed to the published tier.
    pub published_version: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ReferenceViolation>,
    #[serde(default)]
    pub targets: Vec<TargetReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationReport>,
}

impl ReleaseReport {
    /// Number of targets that did not apply the batch.
    pub fn failed_targets(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| !t.outcome.is_applied())
            .count()
    }

    pub fn is_committed(&self) -> bool {
        self.state == ReleaseState::Committed
    }
}

/// The release currently holding the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveReleaseView {
    pub release_id: Uuid,
    pub scope: ReleaseScope,
    pub requested_by: String,
    pub phase: ReleasePhase,
    pub started_at: DateTime<Utc>,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStatus {
    pub active: Option<ActiveReleaseView>,
    pub last: Option<ReleaseReport>,
    pub published_version: u64,
    pub targets: usize,
}
