//! Shared helpers for router-level tests: in-memory state, request builders,
//! and envelope accessors.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use projecthub_api::config::ApiConfig;
use projecthub_api::middleware::rate_limit::{RateLimitSettings, RateQuota};
use projecthub_api::{AppState, router};
use projecthub_core::models::auth::{Role, UserUpdate};
use projecthub_core::store::{MemoryCache, MemoryCredentialStore};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const PASSWORD: &str = "Secret123";

pub fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        jwt_access_secret: "test-access-secret".into(),
        jwt_refresh_secret: "test-refresh-secret".into(),
        access_token_ttl: Duration::minutes(15),
        refresh_token_ttl: Duration::days(7),
        cookie_secure: false,
        frontend_url: "http://localhost:5173".into(),
        password_cost: 4,
        expose_one_time_tokens: true,
        rate_limits: generous_limits(),
    }
}

/// Quotas high enough that ordinary tests never trip them.
pub fn generous_limits() -> RateLimitSettings {
    let quota = RateQuota::new(1_000, StdDuration::from_secs(60));
    RateLimitSettings {
        login: quota,
        auth: quota,
        sensitive: quota,
        client_ip_header: None,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub app: Router,
    /// The same store `state.credentials` points at, for inspecting rows.
    pub store: Arc<MemoryCredentialStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let store = Arc::new(MemoryCredentialStore::new());
        let state = AppState::new(config, store.clone(), Arc::new(MemoryCache::new()));
        let app = router(state.clone());
        Self { state, app, store }
    }

    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, path: &str, body: Value, bearer: Option<&str>) -> Reply {
        self.send(json_request("POST", path, Some(body), bearer, None))
            .await
    }

    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Reply {
        self.send(json_request("GET", path, None, bearer, None)).await
    }

    pub async fn delete(&self, path: &str, bearer: Option<&str>) -> Reply {
        self.send(json_request("DELETE", path, None, bearer, None))
            .await
    }

    /// Register and return the new user's ID.
    pub async fn register(&self, username: &str) -> String {
        let reply = self
            .post(
                "/api/v1/auth/register",
                json!({
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "username": username,
                }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["data"]["user"]["id"]
            .as_str()
            .expect("user id")
            .to_owned()
    }

    /// Log in, returning (access token, refresh token from the cookie).
    pub async fn login(&self, username: &str) -> (String, String) {
        let reply = self
            .post(
                "/api/v1/auth/login",
                json!({ "email": format!("{username}@example.com"), "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        let access = reply.body["data"]["accessToken"]
            .as_str()
            .expect("access token")
            .to_owned();
        let refresh = reply.refresh_cookie().expect("refresh cookie");
        (access, refresh)
    }

    pub async fn set_role(&self, user_id: &str, role: Role) {
        self.state
            .credentials
            .update_user(
                user_id,
                UserUpdate {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("user exists");
    }
}

pub fn json_request(
    method: &str,
    path: &str,
    body: Option<Value>,
    bearer: Option<&str>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }

    /// Value of the `refreshToken` cookie set by this response, if any.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix("refreshToken="))
            .map(|rest| rest.split(';').next().unwrap_or_default().to_owned())
    }
}
