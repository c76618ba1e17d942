//! Authorization middleware. Runs after `require_auth` and rejects with 403
//! when the principal fails a role or verification check.

use axum::{extract::Request, middleware::Next, response::Response};
use projecthub_core::auth::policy;
use projecthub_core::models::auth::{
    ADMIN_ROLES, BUYER_ROLES, FREELANCER_ROLES, PAID_ROLES, Role, SELLER_ROLES,
};

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

fn principal(request: &Request) -> Result<&AuthenticatedUser, AppError> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
}

/// Allow only principals whose role is in `allowed`.
pub async fn require_roles(
    allowed: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    policy::authorize(&principal(&request)?.0, allowed)?;
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    require_roles(ADMIN_ROLES, request, next).await
}

pub async fn require_seller(request: Request, next: Next) -> Result<Response, AppError> {
    require_roles(SELLER_ROLES, request, next).await
}

pub async fn require_buyer(request: Request, next: Next) -> Result<Response, AppError> {
    require_roles(BUYER_ROLES, request, next).await
}

pub async fn require_freelancer(request: Request, next: Next) -> Result<Response, AppError> {
    require_roles(FREELANCER_ROLES, request, next).await
}

pub async fn require_paid(request: Request, next: Next) -> Result<Response, AppError> {
    require_roles(PAID_ROLES, request, next).await
}

/// Allow only principals with a verified email address.
pub async fn require_verified(request: Request, next: Next) -> Result<Response, AppError> {
    policy::require_verified(&principal(&request)?.0)?;
    Ok(next.run(request).await)
}
