//! Per-IP rate limiting for the credential endpoints.
//!
//! Three keyed token buckets, each shared by every route it guards:
//! `login` for `/auth/login`, `auth` for registration and verification
//! resends, `sensitive` for password reset and change.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use tracing::warn;

use crate::error::AppError;

/// Per-IP limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// `max` requests per `window`, refilled gradually.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
    pub max: u32,
    pub window: Duration,
}

impl RateQuota {
    pub const fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }

    fn quota(self) -> Quota {
        let burst = NonZeroU32::new(self.max).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// Quotas for each limiter class.
#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub login: RateQuota,
    pub auth: RateQuota,
    pub sensitive: RateQuota,
    /// Header carrying the client address when behind a proxy (e.g.
    /// `x-forwarded-for`). Without it the socket peer address is used.
    pub client_ip_header: Option<String>,
}

impl Default for RateLimitSettings {
    /// 10 logins per 15 minutes, 5 registrations/resends per 15 minutes,
    /// 3 sensitive operations per hour.
    fn default() -> Self {
        Self {
            login: RateQuota::new(10, Duration::from_secs(15 * 60)),
            auth: RateQuota::new(5, Duration::from_secs(15 * 60)),
            sensitive: RateQuota::new(3, Duration::from_secs(60 * 60)),
            client_ip_header: None,
        }
    }
}

/// The live limiters, shared by every router clone.
pub struct RateLimitConfig {
    pub login: IpLimiter,
    pub auth: IpLimiter,
    pub sensitive: IpLimiter,
    client_ip_header: Option<String>,
}

impl RateLimitConfig {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            login: RateLimiter::keyed(settings.login.quota()),
            auth: RateLimiter::keyed(settings.auth.quota()),
            sensitive: RateLimiter::keyed(settings.sensitive.quota()),
            client_ip_header: settings
                .client_ip_header
                .as_ref()
                .map(|h| h.to_ascii_lowercase()),
        }
    }

    /// Drop buckets that have fully refilled.
    pub fn retain_recent(&self) {
        self.login.retain_recent();
        self.auth.retain_recent();
        self.sensitive.retain_recent();
    }

    fn client_key(&self, request: &Request) -> String {
        let from_header = self.client_ip_header.as_deref().and_then(|name| {
            request
                .headers()
                .get(name)?
                .to_str()
                .ok()?
                .split(',')
                .next()
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        });
        from_header
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ci| ci.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

async fn check(
    config: &RateLimitConfig,
    limiter: &IpLimiter,
    class: &'static str,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = config.client_key(&request);
    if limiter.check_key(&key).is_err() {
        warn!(client = %key, class, path = %request.uri().path(), "rate limit exceeded");
        return Err(AppError::TooManyRequests(
            "Too many requests. Please try again later.".into(),
        ));
    }
    Ok(next.run(request).await)
}

/// Limits `/auth/login`.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check(&config, &config.login, "login", request, next).await
}

/// Limits registration and verification resends.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check(&config, &config.auth, "auth", request, next).await
}

/// Limits forgot/reset/change password.
pub async fn rate_limit_sensitive(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check(&config, &config.sensitive, "sensitive", request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(header: Option<&str>, peer: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/auth/login");
        if let Some(h) = header {
            builder = builder.header("x-forwarded-for", h);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(p) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(p.parse::<SocketAddr>().unwrap()));
        }
        req
    }

    #[test]
    fn burst_then_reject() {
        let config = RateLimitConfig::new(&RateLimitSettings {
            login: RateQuota::new(2, Duration::from_secs(60)),
            ..Default::default()
        });
        let ip = "10.0.0.1".to_string();
        assert!(config.login.check_key(&ip).is_ok());
        assert!(config.login.check_key(&ip).is_ok());
        assert!(config.login.check_key(&ip).is_err());
        assert!(config.login.check_key(&"10.0.0.2".to_string()).is_ok());
    }

    #[test]
    fn client_key_sources() {
        let direct = RateLimitConfig::new(&RateLimitSettings::default());
        assert_eq!(
            direct.client_key(&request_from(Some("1.1.1.1"), Some("10.0.0.9:4000"))),
            "10.0.0.9"
        );
        assert_eq!(direct.client_key(&request_from(None, None)), "unknown");

        let proxied = RateLimitConfig::new(&RateLimitSettings {
            client_ip_header: Some("X-Forwarded-For".into()),
            ..Default::default()
        });
        assert_eq!(
            proxied.client_key(&request_from(Some("1.1.1.1, 10.0.0.1"), Some("10.0.0.9:4000"))),
            "1.1.1.1"
        );
        assert_eq!(
            proxied.client_key(&request_from(None, Some("10.0.0.9:4000"))),
            "10.0.0.9"
        );
    }

    #[test]
    fn zero_max_is_clamped_to_one() {
        let config = RateLimitConfig::new(&RateLimitSettings {
            auth: RateQuota::new(0, Duration::from_secs(60)),
            ..Default::default()
        });
        let ip = "10.0.0.1".to_string();
        assert!(config.auth.check_key(&ip).is_ok());
        assert!(config.auth.check_key(&ip).is_err());
    }
}
