//! User administration handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthenticatedUser, OptionalPrincipal};
use crate::models::{ApiResponse, BanRequest, UserDto, UserProfile};
use crate::services::users;

/// `GET /users/{id}` — optional auth; owner/admin see private fields.
pub async fn get_user_handler(
    State(state): State<AppState>,
    OptionalPrincipal(viewer): OptionalPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let profile = users::profile(&state, &id, viewer.as_ref()).await?;
    Ok(Json(ApiResponse::new(profile, "User retrieved")))
}

/// `DELETE /users/{id}` — owner or admin.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Option<()>>>> {
    users::delete(&state, &principal, &id).await?;
    Ok(Json(ApiResponse::new(None, "User deleted successfully")))
}

/// `POST /users/{id}/ban` — admin only.
pub async fn ban_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Option<()>>>> {
    // The body is optional; an empty one means "no reason given".
    let request: BanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };
    users::ban(&state, &admin, &id, request.reason.as_deref()).await?;
    Ok(Json(ApiResponse::new(None, "User banned successfully")))
}

/// `POST /users/{id}/unban` — admin only.
pub async fn unban_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Option<()>>>> {
    users::unban(&state, &admin, &id).await?;
    Ok(Json(ApiResponse::new(None, "User unbanned successfully")))
}

/// `POST /users/{id}/verify` — admin only.
pub async fn verify_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<UserDto>>> {
    let user = users::verify(&state, &admin, &id).await?;
    Ok(Json(ApiResponse::new(
        UserDto::from(&user),
        "User verified successfully",
    )))
}
