//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ApiResponse, AuthPayload, ChangePasswordRequest, EmailRequest, LoginRequest, MessagePayload,
    RefreshRequest, RegisterPayload, RegisterRequest, ResetPasswordRequest, TokenRequest, UserDto,
};
use crate::services::auth::{self, Session};
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: Session,
    message: &str,
) -> (CookieJar, Json<ApiResponse<AuthPayload>>) {
    let jar = jar.add(refresh_cookie(
        &session.tokens.refresh_token,
        state.authority.refresh_ttl(),
        state.config.cookie_secure,
    ));
    let payload = AuthPayload {
        user: UserDto::from(&session.user),
        access_token: session.tokens.access_token,
    };
    (jar, Json(ApiResponse::new(payload, message)))
}

/// Cookie first, then an optional JSON body `{refreshToken}`.
fn refresh_token_from(jar: &CookieJar, body: &Bytes) -> Result<Option<String>, AppError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE).filter(|c| !c.value().is_empty()) {
        return Ok(Some(cookie.value().to_owned()));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let parsed: RefreshRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    Ok(parsed.refresh_token.filter(|t| !t.is_empty()))
}

/// `POST /auth/register` — create an account.
pub async fn register_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<RegisterPayload>>)> {
    let (user, verification_token) = auth::register(&state, body).await?;
    let payload = RegisterPayload {
        user: UserDto::from(&user),
        verification_token,
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(payload, "Registration successful")),
    ))
}

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<AuthPayload>>)> {
    let session = auth::login(&state, body).await?;
    Ok(session_response(&state, jar, session, "Login successful"))
}

/// `POST /auth/refresh` — rotate the refresh token. Failures also clear the cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let secure = state.config.cookie_secure;
    let raw = match refresh_token_from(&jar, &body) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            return AppError::Unauthorized("Refresh token required".into()).into_response();
        }
        Err(e) => return e.into_response(),
    };
    match auth::refresh(&state, &raw).await {
        Ok(session) => {
            session_response(&state, jar, session, "Token refreshed successfully").into_response()
        }
        Err(e) => (jar.add(clear_refresh_cookie(secure)), e).into_response(),
    }
}

/// `POST /auth/logout` — revoke the refresh token (if any) and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<ApiResponse<Option<()>>>)> {
    // A malformed body is not worth failing a logout over.
    let raw = refresh_token_from(&jar, &body).unwrap_or_default();
    auth::logout(&state, raw.as_deref()).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.cookie_secure));
    Ok((jar, Json(ApiResponse::new(None, "Logout successful"))))
}

/// `POST /auth/verify-email`
pub async fn verify_email_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<TokenRequest>,
) -> AppResult<Json<ApiResponse<UserDto>>> {
    let user = auth::verify_email(&state, body).await?;
    Ok(Json(ApiResponse::new(
        UserDto::from(&user),
        "Email verified successfully",
    )))
}

/// `POST /auth/resend-verification`
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<EmailRequest>,
) -> AppResult<Json<ApiResponse<MessagePayload>>> {
    let payload = auth::resend_verification(&state, body).await?;
    let message = payload.message.clone();
    Ok(Json(ApiResponse::new(payload, message)))
}

/// `POST /auth/forgot-password`
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<EmailRequest>,
) -> AppResult<Json<ApiResponse<MessagePayload>>> {
    let payload = auth::forgot_password(&state, body).await?;
    let message = payload.message.clone();
    Ok(Json(ApiResponse::new(payload, message)))
}

/// `POST /auth/reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<Option<()>>>> {
    auth::reset_password(&state, body).await?;
    Ok(Json(ApiResponse::new(None, "Password reset successful")))
}

/// `GET /auth/me` — the authenticated caller.
pub async fn me_handler(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<UserDto>>> {
    let user = auth::current_user(&state, &principal.id).await?;
    Ok(Json(ApiResponse::new(UserDto::from(&user), "User retrieved")))
}

/// `POST /auth/change-password` — ends every session, including this one.
pub async fn change_password_handler(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    jar: CookieJar,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<Option<()>>>)> {
    auth::change_password(&state, &principal.id, body).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.cookie_secure));
    Ok((
        jar,
        Json(ApiResponse::new(None, "Password changed successfully")),
    ))
}
