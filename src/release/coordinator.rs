//! The release state machine.
//!
//! ```text
//! Requested → Snapshotting → Validating → Pushing → Aggregating → Committing → Committed
//!                                 │                      │
//!                                 ▼                      ▼
//!                             Rejected            Failed / Cancelled
//! ```
//!
//! At most one release holds the coordinator. The published tier only moves
//! when every target reported Applied; this is best-effort fleet consistency,
//! not a distributed transaction.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::plan::PushBatch;
use super::push::{GatewayPush, GatewayTarget, PushOutcome};
use super::report::{
    ActiveReleaseView, CompensationReport, ReleasePhase, ReleaseReport, ReleaseState,
    ReleaseStatus, TargetReport,
};
use super::targets::TargetRegistry;
use super::validate::{validate_snapshot, ReferenceViolation};
use crate::config::schema::ReleaseConfig;
use crate::error::{AdminError, AdminResult};
use crate::model::ReleaseScope;
use crate::observability::metrics;
use crate::resilience::{retry, AttemptEnd, BackoffPolicy, RetryPolicy};
use crate::store::{CommitMeta, ConfigStore, PublishedSnapshot};

/// Tunables of the release pipeline.
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    pub retry: RetryPolicy,
    pub compensate_on_failure: bool,
    pub report_history: usize,
}

impl From<&ReleaseConfig> for ReleaseSettings {
    fn from(config: &ReleaseConfig) -> Self {
        Self {
            retry: RetryPolicy {
                attempts: config.push_attempts,
                attempt_timeout: Duration::from_millis(config.push_timeout_ms),
                backoff: BackoffPolicy {
                    base_ms: config.backoff_base_ms,
                    max_ms: config.backoff_max_ms,
                },
            },
            compensate_on_failure: config.compensate_on_failure,
            report_history: config.report_history,
        }
    }
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self::from(&ReleaseConfig::default())
    }
}

struct ActiveRelease {
    id: Uuid,
    scope: ReleaseScope,
    requested_by: String,
    phase: ReleasePhase,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Frees the release slot however the release future ends.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<ActiveRelease>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// What a run accumulated before reaching a terminal state.
#[derive(Default)]
struct RunRecord {
    draft_revision: Option<u64>,
    published_version: Option<u64>,
    violations: Vec<ReferenceViolation>,
    targets: Vec<TargetReport>,
    compensation: Option<CompensationReport>,
}

pub struct ReleaseCoordinator {
    store: Arc<ConfigStore>,
    targets: Arc<TargetRegistry>,
    pusher: Arc<dyn GatewayPush>,
    settings: ReleaseSettings,
    active: Mutex<Option<ActiveRelease>>,
    /// Newest first.
    reports: RwLock<VecDeque<ReleaseReport>>,
}

impl ReleaseCoordinator {
    pub fn new(
        store: Arc<ConfigStore>,
        targets: Arc<TargetRegistry>,
        pusher: Arc<dyn GatewayPush>,
        settings: ReleaseSettings,
    ) -> Self {
        Self {
            store,
            targets,
            pusher,
            settings,
            active: Mutex::new(None),
            reports: RwLock::new(VecDeque::new()),
        }
    }

    /// Run a release to a terminal state.
    ///
    /// Returns the report when the snapshot was committed. Rejected, failed and
    /// cancelled releases come back as the matching [`AdminError`] carrying the
    /// report; a concurrent request gets [`AdminError::Busy`].
    pub async fn release(&self, scope: ReleaseScope, requested_by: &str) -> AdminResult<ReleaseReport> {
        let (release_id, cancel) = self.acquire(scope, requested_by)?;
        let _slot = SlotGuard { slot: &self.active };

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(%release_id, %scope, requested_by, "Release requested");

        let mut record = RunRecord::default();
        let outcome = self.run(release_id, scope, requested_by, &cancel, &mut record).await;
        let state = match &outcome {
            Ok(state) => *state,
            Err(_) => ReleaseState::Failed,
        };

        let report = ReleaseReport {
            release_id,
            scope,
            state,
            requested_by: requested_by.to_string(),
            draft_revision: record.draft_revision,
            published_version: record.published_version,
            started_at,
            finished_at: Utc::now(),
            violations: record.violations,
            targets: record.targets,
            compensation: record.compensation,
        };

        metrics::record_release(scope, state, clock.elapsed());
        self.remember(report.clone());
        tracing::info!(
            %release_id,
            %state,
            version = ?report.published_version,
            failed_targets = report.failed_targets(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "Release finished"
        );

        outcome?;
        match state {
            ReleaseState::Committed => Ok(report),
            ReleaseState::Rejected => Err(AdminError::ReleaseRejected(Box::new(report))),
            ReleaseState::Failed => Err(AdminError::ReleaseFailed(Box::new(report))),
            ReleaseState::Cancelled => Err(AdminError::ReleaseCancelled(Box::new(report))),
        }
    }

    fn acquire(&self, scope: ReleaseScope, requested_by: &str) -> AdminResult<(Uuid, CancellationToken)> {
        let mut slot = self.active.lock();
        if let Some(active) = slot.as_ref() {
            tracing::warn!(in_flight = %active.id, %scope, requested_by, "Release rejected, coordinator busy");
            return Err(AdminError::Busy(active.id));
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *slot = Some(ActiveRelease {
            id,
            scope,
            requested_by: requested_by.to_string(),
            phase: ReleasePhase::Requested,
            started_at: Utc::now(),
            cancel: cancel.clone(),
        });
        Ok((id, cancel))
    }

    fn enter(&self, phase: ReleasePhase) {
        if let Some(active) = self.active.lock().as_mut() {
            tracing::debug!(release_id = %active.id, ?phase, "Release phase");
            active.phase = phase;
        }
    }

    async fn run(
        &self,
        release_id: Uuid,
        scope: ReleaseScope,
        requested_by: &str,
        cancel: &CancellationToken,
        record: &mut RunRecord,
    ) -> AdminResult<ReleaseState> {
        self.enter(ReleasePhase::Snapshotting);
        let snapshot = self.store.snapshot_draft();
        record.draft_revision = Some(snapshot.revision);
        if cancel.is_cancelled() {
            return Ok(ReleaseState::Cancelled);
        }

        self.enter(ReleasePhase::Validating);
        let violations = validate_snapshot(&snapshot);
        if !violations.is_empty() {
            tracing::warn!(%release_id, violations = violations.len(), "Release rejected by reference validation");
            record.violations = violations;
            return Ok(ReleaseState::Rejected);
        }
        if cancel.is_cancelled() {
            return Ok(ReleaseState::Cancelled);
        }

        self.enter(ReleasePhase::Pushing);
        let previous = self.store.published();
        let batch = PushBatch::build(release_id, scope, previous.version + 1, &snapshot)
            .map_err(|e| AdminError::Internal(format!("failed to encode push batch: {e}")))?;
        let targets = self.targets.snapshot();
        if targets.is_empty() {
            tracing::warn!(%release_id, "No gateway targets registered, committing without a push");
        }
        let results = join_all(
            targets
                .iter()
                .map(|target| self.push_to(target, &batch, cancel)),
        )
        .await;

        self.enter(ReleasePhase::Aggregating);
        record.targets = results;
        let all_applied = record.targets.iter().all(|t| t.outcome.is_applied());
        let any_cancelled = record
            .targets
            .iter()
            .any(|t| t.outcome == PushOutcome::Cancelled);

        if !all_applied {
            if any_cancelled || cancel.is_cancelled() {
                return Ok(ReleaseState::Cancelled);
            }
            if self.settings.compensate_on_failure {
                record.compensation = self.compensate(release_id, &previous, &record.targets).await;
            }
            return Ok(ReleaseState::Failed);
        }

        // Cancellation is decided under the slot lock so that a cancel
        // racing with this transition either wins or gets Conflict.
        {
            let mut slot = self.active.lock();
            if cancel.is_cancelled() {
                return Ok(ReleaseState::Cancelled);
            }
            if let Some(active) = slot.as_mut() {
                active.phase = ReleasePhase::Committing;
            }
        }

        let meta = CommitMeta {
            release_id,
            scope,
            committed_by: requested_by.to_string(),
        };
        let committed = self.store.commit_published(snapshot, meta)?;
        record.published_version = Some(committed.version);
        Ok(ReleaseState::Committed)
    }

    async fn push_to(
        &self,
        target: &GatewayTarget,
        batch: &PushBatch,
        cancel: &CancellationToken,
    ) -> TargetReport {
        let clock = Instant::now();
        let retried = retry(
            &self.settings.retry,
            cancel,
            |_attempt| self.pusher.push(target, batch),
            |outcome: &PushOutcome| matches!(outcome, PushOutcome::Failed(_) | PushOutcome::Timeout),
        )
        .await;

        let outcome = match retried.end {
            AttemptEnd::Completed(outcome) => outcome,
            AttemptEnd::TimedOut => PushOutcome::Timeout,
            AttemptEnd::Cancelled => PushOutcome::Cancelled,
        };
        metrics::record_push(&target.name, outcome.label());
        match &outcome {
            PushOutcome::Applied => tracing::debug!(
                gateway = %target.name,
                attempts = retried.attempts,
                "Gateway applied configuration"
            ),
            other => tracing::warn!(
                gateway = %target.name,
                url = %target.url,
                attempts = retried.attempts,
                outcome = ?other,
                "Gateway did not apply configuration"
            ),
        }

        TargetReport {
            target: target.name.clone(),
            url: target.url.to_string(),
            outcome,
            attempts: retried.attempts,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        }
    }

    /// Re-push `previous` to every target that applied the failed batch.
    async fn compensate(
        &self,
        release_id: Uuid,
        previous: &PublishedSnapshot,
        results: &[TargetReport],
    ) -> Option<CompensationReport> {
        if previous.version == 0 {
            tracing::warn!(%release_id, "Nothing published yet, skipping compensation");
            return None;
        }

        let applied: Vec<GatewayTarget> = {
            let targets = self.targets.snapshot();
            targets
                .iter()
                .filter(|t| {
                    results
                        .iter()
                        .any(|r| r.target == t.name && r.outcome.is_applied())
                })
                .cloned()
                .collect()
        };
        if applied.is_empty() {
            return None;
        }

        let batch = match PushBatch::build(release_id, ReleaseScope::All, previous.version, &previous.config) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(%release_id, error = %e, "Failed to encode compensation batch");
                return None;
            }
        };
        tracing::warn!(
            %release_id,
            restored_version = previous.version,
            targets = applied.len(),
            "Rolling back gateways that applied a failed release"
        );

        // Compensation is not cancellable.
        let never = CancellationToken::new();
        let targets = join_all(applied.iter().map(|t| self.push_to(t, &batch, &never))).await;
        Some(CompensationReport {
            restored_version: previous.version,
            targets,
        })
    }

    fn remember(&self, report: ReleaseReport) {
        let mut reports = self.reports.write();
        reports.push_front(report);
        reports.truncate(self.settings.report_history.max(1));
    }

    /// Request cancellation of the in-flight release.
    ///
    /// `release_id`, when given, must name the in-flight release.
    pub fn cancel(&self, release_id: Option<Uuid>) -> AdminResult<Uuid> {
        let slot = self.active.lock();
        let Some(active) = slot.as_ref() else {
            return Err(AdminError::NotFound {
                subject: "release".to_string(),
                key: release_id.map_or_else(|| "in-flight".to_string(), |id| id.to_string()),
            });
        };
        if let Some(requested) = release_id {
            if requested != active.id {
                return Err(AdminError::NotFound {
                    subject: "release".to_string(),
                    key: requested.to_string(),
                });
            }
        }
        if active.phase == ReleasePhase::Committing {
            return Err(AdminError::Conflict(format!(
                "release {} is already committing",
                active.id
            )));
        }

        active.cancel.cancel();
        tracing::info!(release_id = %active.id, phase = ?active.phase, "Release cancellation requested");
        Ok(active.id)
    }

    pub fn status(&self) -> ReleaseStatus {
        let active = self.active.lock().as_ref().map(|a| ActiveReleaseView {
            release_id: a.id,
            scope: a.scope,
            requested_by: a.requested_by.clone(),
            phase: a.phase,
            started_at: a.started_at,
            cancel_requested: a.cancel.is_cancelled(),
        });
        ReleaseStatus {
            active,
            last: self.reports.read().front().cloned(),
            published_version: self.store.published().version,
            targets: self.targets.len(),
        }
    }

    /// Retained release reports, newest first.
    pub fn history(&self) -> Vec<ReleaseReport> {
        self.reports.read().iter().cloned().collect()
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }
}
