//! Authentication service: account and session flows delegating to
//! `projecthub_core::auth`.

use projecthub_core::auth::{AuthError, FieldError, password, validation};
use projecthub_core::models::auth::{NewUser, Role, TokenPair, User, UserUpdate};
use projecthub_core::store::blocklist::TokenPurpose;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChangePasswordRequest, EmailRequest, LoginRequest, MessagePayload, RegisterRequest,
    ResetPasswordRequest, TokenRequest,
};

/// A freshly started session: the user plus the pair to hand out.
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

// ---------------------------------------------------------------------------
// Password hashing (bcrypt is CPU-bound; keep it off the async workers)
// ---------------------------------------------------------------------------

pub async fn hash_password(state: &AppState, plain: &str) -> AppResult<String> {
    let plain = plain.to_owned();
    let cost = state.config.password_cost;
    tokio::task::spawn_blocking(move || password::hash_password_with_cost(&plain, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?
        .map_err(AppError::from)
}

pub async fn verify_password(plain: &str, hash: &str) -> AppResult<bool> {
    let plain = plain.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?
        .map_err(AppError::from)
}

// ---------------------------------------------------------------------------
// Registration & login
// ---------------------------------------------------------------------------

fn validate_registration(req: &RegisterRequest) -> Result<(), AuthError> {
    let mut errors = match req.validate() {
        Ok(()) => Vec::new(),
        Err(e) => validation::field_errors(&e),
    };
    if let Some(role) = req.role
        && !role.is_self_assignable()
    {
        errors.push(FieldError::new("role", "Invalid role"));
    }
    validation::finish(errors)
}

/// Create an account and mint its email-verification token.
pub async fn register(state: &AppState, mut req: RegisterRequest) -> AppResult<(User, String)> {
    req.email = validation::normalize_email(&req.email);
    validate_registration(&req)?;

    if state
        .credentials
        .find_user_by_email(&req.email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if state
        .credentials
        .find_user_by_username(&req.username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash = hash_password(state, &req.password).await?;
    let user = state
        .credentials
        .create_user(NewUser {
            email: req.email,
            username: req.username,
            full_name: req.full_name,
            password_hash,
            role: req.role.unwrap_or(Role::FreeUser),
        })
        .await?;

    let verification_token = state
        .one_time
        .issue(TokenPurpose::VerifyEmail, &user.id)
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok((user, verification_token))
}

/// Check credentials and start a session.
pub async fn login(state: &AppState, mut req: LoginRequest) -> AppResult<Session> {
    req.email = validation::normalize_email(&req.email);
    req.validate().map_err(AuthError::from)?;

    let user = state
        .credentials
        .find_user_by_email(&req.email)
        .await?
        .ok_or(AuthError::CredentialError)?;

    if !verify_password(&req.password, &user.password_hash).await? {
        return Err(AuthError::CredentialError.into());
    }
    if user.is_banned {
        return Err(AppError::Forbidden("Your account has been banned".into()));
    }
    if !user.is_active {
        return Err(AppError::Forbidden("Your account has been deactivated".into()));
    }

    let tokens = state
        .authority
        .start_session(state.credentials.as_ref(), &user)
        .await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Session { user, tokens })
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Rotate a refresh token. Every failure surfaces as 401 so clients treat
/// the session as over.
pub async fn refresh(state: &AppState, raw_refresh_token: &str) -> AppResult<Session> {
    match state
        .authority
        .rotate(state.credentials.as_ref(), raw_refresh_token)
        .await
    {
        Ok((user, tokens)) => Ok(Session { user, tokens }),
        Err(AuthError::Store(e)) => Err(e.into()),
        Err(AuthError::Internal(msg)) => Err(AppError::Internal(msg)),
        Err(AuthError::TokenExpired) => {
            Err(AppError::Unauthorized("Refresh token expired".into()))
        }
        Err(AuthError::TokenInvalid) | Err(AuthError::WrongTokenType) => {
            Err(AppError::Unauthorized("Invalid refresh token".into()))
        }
        Err(e) => Err(AppError::Unauthorized(e.to_string())),
    }
}

/// Delete the record behind a refresh token. Idempotent.
pub async fn logout(state: &AppState, raw_refresh_token: Option<&str>) -> AppResult<()> {
    if let Some(raw) = raw_refresh_token.filter(|t| !t.is_empty()) {
        state
            .authority
            .revoke(state.credentials.as_ref(), raw)
            .await?;
        info!("refresh token revoked");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Email verification
// ---------------------------------------------------------------------------

pub async fn verify_email(state: &AppState, req: TokenRequest) -> AppResult<User> {
    req.validate().map_err(AuthError::from)?;

    let user_id = state
        .one_time
        .consume(TokenPurpose::VerifyEmail, &req.token)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".into()))?;

    let user = state
        .credentials
        .update_user(
            &user_id,
            UserUpdate {
                is_verified: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".into()))?;

    info!(user_id = %user.id, "email verified");
    Ok(user)
}

/// Mint a new verification token. Unknown and already-verified emails get the
/// same answer as unverified ones.
pub async fn resend_verification(
    state: &AppState,
    mut req: EmailRequest,
) -> AppResult<MessagePayload> {
    const MESSAGE: &str = "If an account exists, a verification email has been sent";
    req.email = validation::normalize_email(&req.email);
    req.validate().map_err(AuthError::from)?;

    let Some(user) = state.credentials.find_user_by_email(&req.email).await? else {
        return Ok(MessagePayload::new(MESSAGE));
    };
    if user.is_verified {
        debug!(user_id = %user.id, "verification resend for verified account ignored");
        return Ok(MessagePayload::new(MESSAGE));
    }

    let token = state
        .one_time
        .issue(TokenPurpose::VerifyEmail, &user.id)
        .await?;
    info!(user_id = %user.id, "verification token reissued");
    Ok(MessagePayload {
        message: MESSAGE.into(),
        token: state.config.expose_one_time_tokens.then_some(token),
    })
}

// ---------------------------------------------------------------------------
// Password reset & change
// ---------------------------------------------------------------------------

pub async fn forgot_password(state: &AppState, mut req: EmailRequest) -> AppResult<MessagePayload> {
    const MESSAGE: &str = "If an account exists, a reset email has been sent";
    req.email = validation::normalize_email(&req.email);
    req.validate().map_err(AuthError::from)?;

    let Some(user) = state.credentials.find_user_by_email(&req.email).await? else {
        return Ok(MessagePayload::new(MESSAGE));
    };

    let token = state
        .one_time
        .issue(TokenPurpose::ResetPassword, &user.id)
        .await?;
    info!(user_id = %user.id, "password reset requested");
    Ok(MessagePayload {
        message: MESSAGE.into(),
        token: state.config.expose_one_time_tokens.then_some(token),
    })
}

/// Set a new password from a reset token and end every session of the user.
pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> AppResult<()> {
    req.validate().map_err(AuthError::from)?;

    let user_id = state
        .one_time
        .consume(TokenPurpose::ResetPassword, &req.token)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".into()))?;

    let password_hash = hash_password(state, &req.password).await?;
    let updated = state
        .credentials
        .update_user(
            &user_id,
            UserUpdate {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;
    if updated.is_none() {
        warn!(user_id = %user_id, "reset token outlived its user");
        return Err(AppError::BadRequest("Invalid or expired reset token".into()));
    }

    let revoked = state
        .authority
        .revoke_all(state.credentials.as_ref(), &user_id)
        .await?;
    info!(user_id = %user_id, revoked, "password reset completed");
    Ok(())
}

pub async fn change_password(
    state: &AppState,
    user_id: &str,
    req: ChangePasswordRequest,
) -> AppResult<()> {
    req.validate().map_err(AuthError::from)?;

    let user = state
        .credentials
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password(&req.current_password, &user.password_hash).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let password_hash = hash_password(state, &req.new_password).await?;
    state
        .credentials
        .update_user(
            user_id,
            UserUpdate {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    let revoked = state
        .authority
        .revoke_all(state.credentials.as_ref(), user_id)
        .await?;
    info!(user_id = %user_id, revoked, "password changed");
    Ok(())
}

/// Load the caller's own record.
pub async fn current_user(state: &AppState, user_id: &str) -> AppResult<User> {
    state
        .credentials
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
