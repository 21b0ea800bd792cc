//! Publish entry points and release control.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::Caller;
use super::extract::Params;
use crate::auth::{Identity, Operation};
use crate::error::{AdminError, AdminResult};
use crate::http::server::AppState;
use crate::model::ReleaseScope;
use crate::release::{ReleaseReport, ReleaseStatus};

#[derive(Debug, Default, Deserialize)]
pub struct CancelParam {
    #[serde(default)]
    pub release_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CancelAccepted {
    pub release_id: Uuid,
    pub cancel_requested: bool,
}

/// Run a release on its own task so a dropped client connection or request
/// timeout does not abandon it halfway.
async fn publish(state: AppState, identity: Identity, scope: ReleaseScope) -> AdminResult<Json<ReleaseReport>> {
    state.access.authorize(&identity, Operation::Publish(scope))?;

    let coordinator = state.coordinator.clone();
    let requested_by = identity.subject;
    let report = tokio::spawn(async move { coordinator.release(scope, &requested_by).await })
        .await
        .map_err(|e| AdminError::Internal(format!("release task failed: {e}")))??;

    Ok(Json(report))
}

pub async fn publish_resources(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<ReleaseReport>> {
    publish(state, identity, ReleaseScope::Resource).await
}

pub async fn publish_methods(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<ReleaseReport>> {
    publish(state, identity, ReleaseScope::Method).await
}

pub async fn publish_plugin_groups(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<ReleaseReport>> {
    publish(state, identity, ReleaseScope::PluginGroup).await
}

pub async fn publish_all(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<ReleaseReport>> {
    publish(state, identity, ReleaseScope::All).await
}

pub async fn cancel_release(
    State(state): State<AppState>,
    Caller(identity): Caller,
    params: Result<Params<CancelParam>, AdminError>,
) -> AdminResult<(StatusCode, Json<CancelAccepted>)> {
    state.access.authorize(&identity, Operation::CancelRelease)?;
    let Params(CancelParam { release_id }) = params?;

    let release_id = state.coordinator.cancel(release_id)?;
    tracing::info!(%release_id, by = %identity.subject, "Release cancel accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelAccepted {
            release_id,
            cancel_requested: true,
        }),
    ))
}

pub async fn release_status(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<ReleaseStatus>> {
    state.access.authorize(&identity, Operation::ReleaseStatus)?;
    Ok(Json(state.coordinator.status()))
}

pub async fn release_history(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<Vec<ReleaseReport>>> {
    state.access.authorize(&identity, Operation::ReleaseHistory)?;
    Ok(Json(state.coordinator.history()))
}
