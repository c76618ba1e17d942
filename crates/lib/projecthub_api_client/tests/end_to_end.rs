//! Full round trip against the real router: login, protected call, access
//! token expiry, transparent refresh via the cookie, replay.

use std::time::Duration;

use projecthub_api::config::ApiConfig;
use projecthub_api::middleware::rate_limit::RateLimitSettings;
use projecthub_api::{AppState, router};
use projecthub_api_client::{ApiClient, ClientError};
use serde_json::json;

fn config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        jwt_access_secret: "e2e-access".into(),
        jwt_refresh_secret: "e2e-refresh".into(),
        access_token_ttl: chrono::Duration::seconds(1),
        refresh_token_ttl: chrono::Duration::days(7),
        cookie_secure: false,
        frontend_url: "http://localhost:5173".into(),
        password_cost: 4,
        expose_one_time_tokens: true,
        rate_limits: RateLimitSettings::default(),
    }
}

async fn spawn_api() -> String {
    let app = router(AppState::in_memory(config()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let base = spawn_api().await;
    let client = ApiClient::new(base).unwrap();

    let _: serde_json::Value = client
        .post(
            "/auth/register",
            &json!({
                "email": "e2e@example.com",
                "password": "Secret123",
                "username": "e2e",
            }),
        )
        .await
        .unwrap();
    let user = client.login("e2e@example.com", "Secret123").await.unwrap();
    assert_eq!(user.username, "e2e");
    let first_token = client.access_token().unwrap();

    assert_eq!(client.me().await.unwrap().id, user.id);

    tokio::time::sleep(Duration::from_millis(2100)).await;

    // The stored token is expired; the interceptor refreshes via the cookie.
    let me = client.me().await.unwrap();
    assert_eq!(me.id, user.id);
    assert_ne!(client.access_token().unwrap(), first_token);

    client.logout().await.unwrap();
    assert!(client.access_token().is_none());

    // With the refresh token revoked, a protected call cannot recover.
    let err = client.me().await.unwrap_err();
    assert!(matches!(err, ClientError::RefreshFailed), "{err:?}");
}
