//! Session layer.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthError, Identity};
use crate::error::AdminError;
use crate::http::server::AppState;

/// Resolve the bearer token into an [`Identity`] and attach it to the request.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AdminError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| AuthError::MalformedHeader))
        .transpose()?;

    let identity = state.access.authenticate(header)?;
    tracing::debug!(username = %identity.subject, role = %identity.role, "Session verified");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// The authenticated caller, as attached by [`require_session`].
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AdminError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Caller)
            .ok_or_else(|| AdminError::Unauthenticated("no session on request".to_string()))
    }
}
