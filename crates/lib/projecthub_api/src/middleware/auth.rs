//! Authentication middleware: resolves the bearer credential into a
//! `Principal` via the `AuthGate` and stores it in request extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use projecthub_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppError;

/// Key used to store the authenticated `Principal` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

/// Set by `optional_auth`: the principal when the credential checked out.
#[derive(Debug, Clone, Default)]
pub struct OptionalPrincipal(pub Option<Principal>);

fn authorization(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Axum middleware: mandatory authentication. Any gate failure ends the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = state.gate.authenticate(authorization(&request)).await?;
    request.extensions_mut().insert(AuthenticatedUser(principal));
    Ok(next.run(request).await)
}

/// Axum middleware: optional authentication. Never rejects.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = state
        .gate
        .authenticate_optional(authorization(&request))
        .await;
    request.extensions_mut().insert(OptionalPrincipal(principal));
    next.run(request).await
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for OptionalPrincipal {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<OptionalPrincipal>()
            .cloned()
            .unwrap_or_default())
    }
}
