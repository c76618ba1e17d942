//! # projecthub_api
//!
//! HTTP API library for ProjectHub: authentication, session refresh, and
//! user administration routes.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use projecthub_core::auth::authority::TokenAuthority;
use projecthub_core::auth::gate::AuthGate;
use projecthub_core::store::{
    Blocklist, Cache, CredentialStore, MemoryCache, MemoryCredentialStore, OneTimeTokens,
    PgCache, PgCredentialStore,
};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::handlers::{auth, health, users};
use crate::middleware::auth::{optional_auth, require_auth};
use crate::middleware::authorize::require_admin;
use crate::middleware::rate_limit::{
    RateLimitConfig, rate_limit_auth, rate_limit_login, rate_limit_sensitive,
};
use crate::middleware::request_id::{REQUEST_ID_HEADER, assign_request_id};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Users and refresh-token records.
    pub credentials: Arc<dyn CredentialStore>,
    pub authority: TokenAuthority,
    pub gate: AuthGate,
    pub blocklist: Blocklist,
    /// Email-verification and password-reset tokens.
    pub one_time: OneTimeTokens,
    /// Per-IP limiters for the credential endpoints.
    pub rate_limits: Arc<RateLimitConfig>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the auth core over the given collaborators.
    pub fn new(
        config: ApiConfig,
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let authority = TokenAuthority::new(
            config.jwt_access_secret.as_bytes(),
            config.jwt_refresh_secret.as_bytes(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        let blocklist = Blocklist::new(cache.clone());
        let gate = AuthGate::new(authority.clone(), blocklist.clone(), credentials.clone());
        Self {
            credentials,
            authority,
            gate,
            blocklist,
            one_time: OneTimeTokens::new(cache),
            rate_limits: Arc::new(RateLimitConfig::new(&config.rate_limits)),
            config,
        }
    }

    /// PostgreSQL-backed credentials and cache.
    pub fn with_postgres(config: ApiConfig, pool: PgPool) -> Self {
        Self::new(
            config,
            Arc::new(PgCredentialStore::new(pool.clone())),
            Arc::new(PgCache::new(pool)),
        )
    }

    /// Process-local stores, for tests and single-process development.
    pub fn in_memory(config: ApiConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryCache::new()),
        )
    }
}

/// Run embedded database migrations.
///
/// Delegates to `projecthub_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    projecthub_core::migrate::migrate(pool).await
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([REQUEST_ID_HEADER])
        .allow_credentials(true);
    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            warn!(frontend_url, error = %e, "invalid FRONTEND_URL, cross-origin requests disabled");
            cors
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);
    let limits = state.rate_limits.clone();
    let login_limit = from_fn_with_state(limits.clone(), rate_limit_login);
    let auth_limit = from_fn_with_state(limits.clone(), rate_limit_auth);
    let sensitive_limit = from_fn_with_state(limits, rate_limit_sensitive);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::HEALTH, get(health::health_handler))
        .route(
            routes::AUTH_REGISTER,
            post(auth::register_handler).route_layer(auth_limit.clone()),
        )
        .route(
            routes::AUTH_LOGIN,
            post(auth::login_handler).route_layer(login_limit),
        )
        .route(routes::AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::AUTH_VERIFY_EMAIL, post(auth::verify_email_handler))
        .route(
            routes::AUTH_RESEND_VERIFICATION,
            post(auth::resend_verification_handler).route_layer(auth_limit),
        )
        .route(
            routes::AUTH_FORGOT_PASSWORD,
            post(auth::forgot_password_handler).route_layer(sensitive_limit.clone()),
        )
        .route(
            routes::AUTH_RESET_PASSWORD,
            post(auth::reset_password_handler).route_layer(sensitive_limit.clone()),
        );

    // GET is optionally authenticated, DELETE requires a principal.
    let user = Router::new().route(
        routes::USER,
        get(users::get_user_handler)
            .route_layer(from_fn_with_state(state.clone(), optional_auth))
            .merge(
                delete(users::delete_user_handler)
                    .route_layer(from_fn_with_state(state.clone(), require_auth)),
            ),
    );

    // Protected routes (require auth). Authentication runs before the limiter.
    let protected = Router::new()
        .route(routes::AUTH_ME, get(auth::me_handler))
        .route(
            routes::AUTH_CHANGE_PASSWORD,
            post(auth::change_password_handler).route_layer(sensitive_limit),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Admin routes: require_auth runs first, then the role check.
    let admin = Router::new()
        .route(routes::USER_BAN, post(users::ban_user_handler))
        .route(routes::USER_UNBAN, post(users::unban_user_handler))
        .route(routes::USER_VERIFY, post(users::verify_user_handler))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(public)
        .merge(user)
        .merge(protected)
        .merge(admin);

    Router::new()
        .nest(routes::API_PREFIX, api)
        .fallback(|| async { AppError::NotFound("Route not found".into()) })
        .layer(cors)
        .layer(from_fn(assign_request_id))
        .with_state(state)
}
