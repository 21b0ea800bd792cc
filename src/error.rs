//! Crate-wide error taxonomy.
//!
//! Every failure surfaced through the admin API carries a stable
//! machine-readable `error_code` and a human-readable message. Release
//! failures carry the full release report so operators see every failing
//! target or reference at once.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{Operation, Role};
use crate::model::{EntityKind, EntityRef, FieldError};
use crate::release::ReleaseReport;
use crate::store::persist::PersistError;

pub type AdminResult<T> = Result<T, AdminError>;

#[derive(Error, Debug)]
pub enum AdminError {
    // ===== Identity & Access =====
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    #[error("operation `{operation}` requires the `{required}` role")]
    Forbidden { operation: Operation, required: Role },

    // ===== Configuration Store =====
    #[error("{subject} `{key}` not found")]
    NotFound { subject: String, key: String },

    #[error("{subject} `{key}` already exists")]
    AlreadyExists { subject: String, key: String },

    #[error("invalid {subject}: {}", join_fields(.errors))]
    Validation {
        subject: String,
        errors: Vec<FieldError>,
    },

    #[error("{target} is still referenced by {} draft entities", .referrers.len())]
    ReferentialConflict {
        target: EntityRef,
        referrers: Vec<EntityRef>,
    },

    // ===== Release =====
    #[error("release {} rejected: {} unresolved references", .0.release_id, .0.violations.len())]
    ReleaseRejected(Box<ReleaseReport>),

    #[error("release {} failed on {} of {} targets", .0.release_id, .0.failed_targets(), .0.targets.len())]
    ReleaseFailed(Box<ReleaseReport>),

    #[error("release {} cancelled before commit", .0.release_id)]
    ReleaseCancelled(Box<ReleaseReport>),

    #[error("release {0} is already in progress")]
    Busy(Uuid),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("conflict: {0}")]
    Conflict(String),

    // ===== Infrastructure =====
    #[error("storage error: {0}")]
    Storage(#[from] PersistError),

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AdminError {
    pub fn not_found(kind: EntityKind, key: impl ToString) -> Self {
        Self::NotFound {
            subject: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn already_exists(kind: EntityKind, key: impl ToString) -> Self {
        Self::AlreadyExists {
            subject: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid(subject: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Validation {
            subject: subject.into(),
            errors,
        }
    }

    /// Single-field validation failure.
    pub fn invalid_field(
        subject: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::invalid(subject, vec![FieldError::new(field, message)])
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AdminError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AdminError::NotFound { .. } => StatusCode::NOT_FOUND,
            AdminError::Validation { .. } => StatusCode::BAD_REQUEST,
            AdminError::AlreadyExists { .. }
            | AdminError::ReferentialConflict { .. }
            | AdminError::ReleaseCancelled(_)
            | AdminError::Busy(_)
            | AdminError::Conflict(_) => StatusCode::CONFLICT,
            AdminError::ReleaseRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdminError::ReleaseFailed(_) => StatusCode::BAD_GATEWAY,
            AdminError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdminError::Storage(_) | AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for programmatic error handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdminError::Unauthenticated(_) => "UNAUTHENTICATED",
            AdminError::Forbidden { .. } => "FORBIDDEN",
            AdminError::NotFound { .. } => "NOT_FOUND",
            AdminError::AlreadyExists { .. } => "ALREADY_EXISTS",
            AdminError::Validation { .. } => "VALIDATION_ERROR",
            AdminError::ReferentialConflict { .. } => "REFERENTIAL_CONFLICT",
            AdminError::ReleaseRejected(_) => "RELEASE_REJECTED",
            AdminError::ReleaseFailed(_) => "RELEASE_FAILED",
            AdminError::ReleaseCancelled(_) => "RELEASE_CANCELLED",
            AdminError::Busy(_) => "BUSY",
            AdminError::Timeout(_) => "TIMEOUT",
            AdminError::Conflict(_) => "CONFLICT",
            AdminError::Storage(_) => "STORAGE_ERROR",
            AdminError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured detail attached to the response body, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            AdminError::Forbidden {
                operation,
                required,
            } => Some(json!({ "operation": operation, "required_role": required })),
            AdminError::NotFound { subject, key } | AdminError::AlreadyExists { subject, key } => {
                Some(json!({ "kind": subject, "key": key }))
            }
            AdminError::Validation { subject, errors } => {
                Some(json!({ "kind": subject, "fields": errors }))
            }
            AdminError::ReferentialConflict { target, referrers } => {
                Some(json!({ "target": target, "referrers": referrers }))
            }
            AdminError::ReleaseRejected(report)
            | AdminError::ReleaseFailed(report)
            | AdminError::ReleaseCancelled(report) => serde_json::to_value(report.as_ref()).ok(),
            AdminError::Busy(release_id) => Some(json!({ "release_id": release_id })),
            _ => None,
        }
    }

    /// The release report carried by a terminal release error.
    pub fn release_report(&self) -> Option<&ReleaseReport> {
        match self {
            AdminError::ReleaseRejected(report)
            | AdminError::ReleaseFailed(report)
            | AdminError::ReleaseCancelled(report) => Some(report),
            _ => None,
        }
    }

    fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, error_code = %code, status = status.as_u16(), "Request failed");
        } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::warn!(error = %self, error_code = %code, "Access denied");
        } else {
            tracing::debug!(error = %self, error_code = %code, "Client error");
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let mut body = json!({
            "error": self.to_string(),
            "error_code": self.error_code(),
            "status": status.as_u16(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = AdminError::not_found(EntityKind::Cluster, "c1");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "cluster `c1` not found");

        let err = AdminError::Busy(Uuid::nil());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.details().unwrap()["release_id"], Uuid::nil().to_string());
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = AdminError::invalid(
            "listener",
            vec![
                FieldError::new("port", "must be between 1 and 65535"),
                FieldError::new("clusters", "must not be empty"),
            ],
        );
        let msg = err.to_string();
        assert!(msg.contains("port: must be between 1 and 65535"));
        assert!(msg.contains("clusters: must not be empty"));
        assert_eq!(err.details().unwrap()["fields"].as_array().unwrap().len(), 2);
    }
}
