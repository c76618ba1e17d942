//! Authorization predicates over an authenticated `Principal`.
//!
//! Each check is a pure function returning `Ok(())` or `AuthError::Forbidden`;
//! combine them by applying in sequence with `?`.

use super::AuthError;
use crate::models::auth::{Principal, Role};

/// Allow only principals whose role is in `allowed`.
pub fn authorize(principal: &Principal, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&principal.role) {
        return Ok(());
    }
    let required = allowed
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(AuthError::Forbidden(format!(
        "Access denied. Required role: {required}"
    )))
}

/// Allow admins unconditionally, otherwise only the resource owner.
///
/// `owner_id` is `None` when the resource does not exist; non-admins then get
/// `NotFound` rather than learning anything about ownership.
pub fn authorize_owner_or_admin(
    principal: &Principal,
    owner_id: Option<&str>,
) -> Result<(), AuthError> {
    if principal.role.is_admin() {
        return Ok(());
    }
    match owner_id {
        None => Err(AuthError::NotFound("Resource not found".into())),
        Some(owner) if owner == principal.id => Ok(()),
        Some(_) => Err(AuthError::Forbidden(
            "Access denied. You do not own this resource".into(),
        )),
    }
}

/// Allow only principals with a verified email.
pub fn require_verified(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_verified {
        Ok(())
    } else {
        Err(AuthError::Forbidden(
            "Please verify your email to access this resource".into(),
        ))
    }
}
