//! Draft CRUD, published-tier reads and the health endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::Caller;
use super::extract::{Params, Payload};
use crate::auth::Operation;
use crate::error::{AdminError, AdminResult};
use crate::http::server::AppState;
use crate::model::{BaseInfo, Tier};
use crate::store::{DeleteOutcome, PublishedSnapshot, PublishedSummary, Stored};

#[derive(Debug, Default, Deserialize)]
pub struct TierParam {
    #[serde(default)]
    pub tier: Tier,
}

#[derive(Debug, Default, Deserialize)]
pub struct CascadeParam {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct VersionParam {
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub draft_revision: u64,
    pub published_version: u64,
}

pub async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        draft_revision: state.store.draft_revision(),
        published_version: state.store.published().version,
    })
}

// ===== Entity CRUD =====

pub async fn list<E: Stored>(
    State(state): State<AppState>,
    Caller(identity): Caller,
    params: Result<Params<TierParam>, AdminError>,
) -> AdminResult<Json<Vec<E>>> {
    state.access.authorize(&identity, Operation::Read)?;
    let Params(TierParam { tier }) = params?;
    Ok(Json(state.store.list::<E>(tier)))
}

pub async fn detail<E: Stored>(
    State(state): State<AppState>,
    Caller(identity): Caller,
    key: Result<Params<E::Key>, AdminError>,
    params: Result<Params<TierParam>, AdminError>,
) -> AdminResult<Json<E>> {
    state.access.authorize(&identity, Operation::Read)?;
    let Params(key) = key?;
    let Params(TierParam { tier }) = params?;
    Ok(Json(state.store.detail::<E>(&key, tier)?))
}

pub async fn create<E: Stored>(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Result<Payload<Value>, AdminError>,
) -> AdminResult<(StatusCode, Json<E>)> {
    state.access.authorize(&identity, Operation::Create(E::KIND))?;
    let Payload(body) = body?;
    let entity: E = serde_json::from_value(body)
        .map_err(|e| AdminError::invalid_field(E::KIND.as_str(), "body", e.to_string()))?;

    let created = state.store.create(entity)?;
    tracing::info!(kind = %E::KIND, key = %created.key(), by = %identity.subject, "Draft entity created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<E: Stored>(
    State(state): State<AppState>,
    Caller(identity): Caller,
    key: Result<Params<E::Key>, AdminError>,
    body: Result<Payload<Value>, AdminError>,
) -> AdminResult<Json<E>> {
    state.access.authorize(&identity, Operation::Update(E::KIND))?;
    let Params(key) = key?;
    let Payload(patch) = body?;

    let updated = state.store.update::<E>(&key, &patch)?;
    tracing::info!(kind = %E::KIND, %key, by = %identity.subject, "Draft entity updated");
    Ok(Json(updated))
}

pub async fn remove<E: Stored>(
    State(state): State<AppState>,
    Caller(identity): Caller,
    key: Result<Params<E::Key>, AdminError>,
    params: Result<Params<CascadeParam>, AdminError>,
) -> AdminResult<Json<DeleteOutcome>> {
    state.access.authorize(&identity, Operation::Delete(E::KIND))?;
    let Params(key) = key?;
    let Params(CascadeParam { cascade }) = params?;

    let outcome = state.store.delete::<E>(&key, cascade)?;
    tracing::info!(
        kind = %E::KIND,
        %key,
        cascade,
        removed = outcome.removed.len(),
        detached = outcome.detached.len(),
        by = %identity.subject,
        "Draft entity deleted"
    );
    Ok(Json(outcome))
}

// ===== Base info =====

pub async fn get_base(
    State(state): State<AppState>,
    Caller(identity): Caller,
    params: Result<Params<TierParam>, AdminError>,
) -> AdminResult<Json<BaseInfo>> {
    state.access.authorize(&identity, Operation::Read)?;
    let Params(TierParam { tier }) = params?;
    Ok(Json(state.store.base_info(tier)))
}

pub async fn update_base(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Result<Payload<Value>, AdminError>,
) -> AdminResult<Json<BaseInfo>> {
    state.access.authorize(&identity, Operation::UpdateBase)?;
    let Payload(patch) = body?;
    Ok(Json(state.store.set_base_info(&patch)?))
}

// ===== Published tier =====

pub async fn published_history(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<Vec<PublishedSummary>>> {
    state.access.authorize(&identity, Operation::Read)?;
    Ok(Json(state.store.published_history()))
}

pub async fn published_version(
    State(state): State<AppState>,
    Caller(identity): Caller,
    params: Result<Params<VersionParam>, AdminError>,
) -> AdminResult<Json<PublishedSnapshot>> {
    state.access.authorize(&identity, Operation::Read)?;
    let Params(VersionParam { version }) = params?;
    let snapshot = state.store.published_version(version)?;
    Ok(Json(PublishedSnapshot::clone(&snapshot)))
}
