//! API server configuration.

use chrono::Duration;
use projecthub_core::auth::jwt::{
    DEFAULT_ACCESS_EXPIRY, DEFAULT_REFRESH_EXPIRY, parse_expiry, resolve_secret,
};
use tracing::warn;

use crate::middleware::rate_limit::{RateLimitSettings, RateQuota};

/// Default bcrypt cost for password hashing.
pub const DEFAULT_PASSWORD_COST: u32 = 12;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:5000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub jwt_access_secret: String,
    /// Refresh token signing secret.
    pub jwt_refresh_secret: String,
    /// Access token lifetime.
    pub access_token_ttl: Duration,
    /// Refresh token (and refresh cookie) lifetime.
    pub refresh_token_ttl: Duration,
    /// Whether the refresh cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Allowed CORS origin (credentials enabled).
    pub frontend_url: String,
    /// bcrypt cost factor.
    pub password_cost: u32,
    /// Return verification/reset tokens in responses (no email delivery yet).
    pub expose_one_time_tokens: bool,
    /// Per-IP quotas for the credential endpoints.
    pub rate_limits: RateLimitSettings,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                                      |
    /// |----------------------|----------------------------------------------|
    /// | `BIND_ADDR`          | `127.0.0.1:5000`                             |
    /// | `DATABASE_URL`       | `postgres://localhost:5432/projecthub`       |
    /// | `JWT_ACCESS_SECRET`  | generated & persisted to file                |
    /// | `JWT_REFRESH_SECRET` | generated & persisted to file                |
    /// | `JWT_ACCESS_EXPIRY`  | `15m`                                        |
    /// | `JWT_REFRESH_EXPIRY` | `7d`                                         |
    /// | `COOKIE_SECURE`      | `true` unless `APP_ENV=development`          |
    /// | `FRONTEND_URL`       | `http://localhost:5173`                      |
    /// | `EXPOSE_TOKENS`      | `true` only when `APP_ENV=development`       |
    /// | `LOGIN_RATE_LIMIT`   | `10` per 15 minutes                          |
    /// | `AUTH_RATE_LIMIT`    | `5` per 15 minutes                           |
    /// | `SENSITIVE_RATE_LIMIT` | `3` per hour                               |
    /// | `CLIENT_IP_HEADER`   | unset (use the socket peer address)          |
    pub fn from_env() -> Self {
        let is_dev = std::env::var("APP_ENV").is_ok_and(|v| v == "development");
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/projecthub".into()),
            jwt_access_secret: resolve_secret("JWT_ACCESS_SECRET", "jwt-access-secret"),
            jwt_refresh_secret: resolve_secret("JWT_REFRESH_SECRET", "jwt-refresh-secret"),
            access_token_ttl: expiry_from_env("JWT_ACCESS_EXPIRY", DEFAULT_ACCESS_EXPIRY),
            refresh_token_ttl: expiry_from_env("JWT_REFRESH_EXPIRY", DEFAULT_REFRESH_EXPIRY),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(!is_dev),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            password_cost: DEFAULT_PASSWORD_COST,
            expose_one_time_tokens: std::env::var("EXPOSE_TOKENS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(is_dev),
            rate_limits: rate_limits_from_env(),
        }
    }
}

fn rate_limits_from_env() -> RateLimitSettings {
    let defaults = RateLimitSettings::default();
    RateLimitSettings {
        login: quota_from_env("LOGIN_RATE_LIMIT", defaults.login),
        auth: quota_from_env("AUTH_RATE_LIMIT", defaults.auth),
        sensitive: quota_from_env("SENSITIVE_RATE_LIMIT", defaults.sensitive),
        client_ip_header: std::env::var("CLIENT_IP_HEADER")
            .ok()
            .filter(|h| !h.is_empty()),
    }
}

/// Override the request count of a quota; the window stays fixed.
fn quota_from_env(var: &str, default: RateQuota) -> RateQuota {
    match std::env::var(var) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(max) if max > 0 => RateQuota::new(max, default.window),
            _ => {
                warn!(var, value = %raw, default = default.max, "invalid rate limit, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn expiry_from_env(var: &str, default: &str) -> Duration {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    parse_expiry(&raw).unwrap_or_else(|e| {
        warn!(var, error = %e, default, "invalid expiry, using default");
        // Defaults are compile-time constants known to parse.
        parse_expiry(default).unwrap_or_else(|_| Duration::minutes(15))
    })
}
