//! Login and the caller's own account.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::Caller;
use super::extract::Payload;
use crate::auth::{Account, AuthError, Identity, Operation, Role, Session};
use crate::error::{AdminError, AdminResult};
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordChanged {
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct AdminCheck {
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LoggedOut {
    pub logged_out: bool,
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Payload<LoginRequest>, AdminError>,
) -> AdminResult<Json<Session>> {
    let Payload(LoginRequest { username, password }) = body?;
    Ok(Json(state.access.login(&username, &password)?))
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Payload<RegisterRequest>, AdminError>,
) -> AdminResult<(StatusCode, Json<Account>)> {
    let Payload(RegisterRequest { username, password }) = body?;
    let account = state.access.register(&username, &password)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn edit_password(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Result<Payload<PasswordChange>, AdminError>,
) -> AdminResult<Json<PasswordChanged>> {
    state.access.authorize(&identity, Operation::ChangePassword)?;
    let Payload(change) = body?;
    state
        .access
        .change_password(&identity, &change.old_password, &change.new_password)?;
    Ok(Json(PasswordChanged { updated: true }))
}

pub async fn logout(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<LoggedOut>> {
    state.access.authorize(&identity, Operation::Account)?;
    state.access.logout(&identity);
    Ok(Json(LoggedOut { logged_out: true }))
}

pub async fn get_info(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<UserInfo>> {
    let identity = current_account(&state, identity)?;
    Ok(Json(UserInfo {
        username: identity.subject,
        role: identity.role,
        token_expires_at: identity.expires_at,
    }))
}

pub async fn get_user_role(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<RoleInfo>> {
    let identity = current_account(&state, identity)?;
    Ok(Json(RoleInfo { role: identity.role }))
}

pub async fn check_is_admin(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> AdminResult<Json<AdminCheck>> {
    let identity = current_account(&state, identity)?;
    Ok(Json(AdminCheck {
        is_admin: identity.role.satisfies(Role::Admin),
    }))
}

/// Tokens outlive restarts; an account dropped from the config since login
/// no longer has a profile.
fn current_account(state: &AppState, identity: Identity) -> AdminResult<Identity> {
    state.access.authorize(&identity, Operation::Account)?;
    if state.access.account(&identity.subject).is_none() {
        return Err(AuthError::InvalidToken(format!(
            "account `{}` no longer exists",
            identity.subject
        ))
        .into());
    }
    Ok(identity)
}
