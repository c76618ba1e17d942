//! User administration: profiles, account deletion, ban/unban, manual verification.

use projecthub_core::auth::policy;
use projecthub_core::models::auth::{
    AuditAction, AuditEntry, Principal, Role, User, UserUpdate,
};
use projecthub_core::store::blocklist::BAN_TTL;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::UserProfile;

async fn load(state: &AppState, id: &str) -> AppResult<User> {
    state
        .credentials
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn audit(state: &AppState, entry: AuditEntry) -> AppResult<()> {
    state.credentials.record_audit(entry).await?;
    Ok(())
}

/// Public profile; private fields only for the owner or an admin.
pub async fn profile(
    state: &AppState,
    id: &str,
    viewer: Option<&Principal>,
) -> AppResult<UserProfile> {
    let user = load(state, id).await?;
    let private = viewer.is_some_and(|p| p.id == user.id || p.role.is_admin());
    Ok(UserProfile {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        role: user.role,
        is_verified: user.is_verified,
        created_at: user.created_at,
        email: private.then_some(user.email),
        is_active: private.then_some(user.is_active),
        is_banned: private.then_some(user.is_banned),
    })
}

/// Delete an account (owner or admin), ending its sessions and any ban entry.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> AppResult<()> {
    let target = state.credentials.find_user_by_id(id).await?;
    policy::authorize_owner_or_admin(principal, target.as_ref().map(|u| u.id.as_str()))?;
    let Some(target) = target else {
        return Err(AppError::NotFound("User not found".into()));
    };

    state
        .authority
        .revoke_all(state.credentials.as_ref(), &target.id)
        .await?;
    // Recorded while the actor row still exists; self-deletes reference it.
    audit(
        state,
        AuditEntry::user(&principal.id, AuditAction::DeleteUser, &target.id)
            .with_metadata(json!({ "email": target.email, "username": target.username })),
    )
    .await?;
    state.credentials.delete_user(&target.id).await?;
    state.blocklist.remove(&target.id).await?;
    info!(user_id = %target.id, deleted_by = %principal.id, "user deleted");
    Ok(())
}

/// Ban a user: flag the account, end all sessions, and block outstanding
/// access tokens via the blocklist.
pub async fn ban(
    state: &AppState,
    admin: &Principal,
    id: &str,
    reason: Option<&str>,
) -> AppResult<()> {
    if admin.id == id {
        return Err(AppError::BadRequest("You cannot ban yourself".into()));
    }
    let target = load(state, id).await?;
    if target.role == Role::SuperAdmin {
        return Err(AppError::Forbidden("Cannot ban a super admin".into()));
    }

    state
        .credentials
        .update_user(
            &target.id,
            UserUpdate {
                is_banned: Some(true),
                ..Default::default()
            },
        )
        .await?;
    let revoked = state
        .authority
        .revoke_all(state.credentials.as_ref(), &target.id)
        .await?;
    state.blocklist.add(&target.id, BAN_TTL).await?;
    audit(
        state,
        AuditEntry::user(&admin.id, AuditAction::BanUser, &target.id)
            .with_metadata(json!({ "reason": reason })),
    )
    .await?;

    info!(
        user_id = %target.id,
        banned_by = %admin.id,
        reason = reason.unwrap_or(""),
        revoked,
        "user banned"
    );
    Ok(())
}

pub async fn unban(state: &AppState, admin: &Principal, id: &str) -> AppResult<()> {
    let target = load(state, id).await?;
    state
        .credentials
        .update_user(
            &target.id,
            UserUpdate {
                is_banned: Some(false),
                ..Default::default()
            },
        )
        .await?;
    state.blocklist.remove(&target.id).await?;
    audit(
        state,
        AuditEntry::user(&admin.id, AuditAction::UnbanUser, &target.id),
    )
    .await?;
    info!(user_id = %target.id, unbanned_by = %admin.id, "user unbanned");
    Ok(())
}

/// Mark a user's email verified without a token.
pub async fn verify(state: &AppState, admin: &Principal, id: &str) -> AppResult<User> {
    let user = state
        .credentials
        .update_user(
            id,
            UserUpdate {
                is_verified: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    audit(
        state,
        AuditEntry::user(&admin.id, AuditAction::VerifyUser, &user.id),
    )
    .await?;
    info!(user_id = %user.id, verified_by = %admin.id, "user verified by admin");
    Ok(user)
}
