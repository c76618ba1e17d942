//! Interceptor behaviour against a stub server that counts refresh calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use projecthub_api_client::{ApiClient, ClientError};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Default)]
struct Stub {
    refresh_calls: AtomicUsize,
    data_calls: AtomicUsize,
    refresh_fails: AtomicBool,
    valid_token: Mutex<Option<String>>,
}

type Shared = Arc<Stub>;

fn user() -> Value {
    json!({
        "id": "u1",
        "email": "u1@example.com",
        "username": "u1",
        "role": "buyer",
        "isVerified": true,
    })
}

fn error(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": { "code": code, "message": code },
            "meta": { "timestamp": "t" },
        })),
    )
        .into_response()
}

async fn login(State(stub): State<Shared>) -> Json<Value> {
    *stub.valid_token.lock().unwrap() = Some("initial".into());
    Json(json!({
        "success": true,
        "message": "ok",
        "data": { "user": user(), "accessToken": "initial" },
    }))
}

async fn refresh(State(stub): State<Shared>) -> Response {
    let n = stub.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    // Hold the refresh open long enough for every concurrent 401 to queue.
    tokio::time::sleep(Duration::from_millis(150)).await;
    if stub.refresh_fails.load(Ordering::SeqCst) {
        return error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
    }
    let token = format!("refreshed-{n}");
    *stub.valid_token.lock().unwrap() = Some(token.clone());
    Json(json!({
        "success": true,
        "message": "ok",
        "data": { "user": user(), "accessToken": token },
    }))
    .into_response()
}

async fn data(State(stub): State<Shared>, headers: HeaderMap) -> Response {
    stub.data_calls.fetch_add(1, Ordering::SeqCst);
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    let valid = stub.valid_token.lock().unwrap().clone();
    if presented.is_some() && presented == valid {
        Json(json!({ "success": true, "message": "ok", "data": { "value": 42 } })).into_response()
    } else {
        error(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED")
    }
}

async fn forbidden() -> Response {
    error(StatusCode::FORBIDDEN, "FORBIDDEN")
}

async fn spawn_stub() -> (String, Shared) {
    let stub: Shared = Arc::new(Stub::default());
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/data", get(data))
        .route("/api/v1/forbidden", get(forbidden))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/v1"), stub)
}

#[derive(Debug, Deserialize)]
struct Data {
    value: i64,
}

/// Log in, then invalidate the token server-side as if it expired.
async fn logged_in_then_expired(client: &ApiClient, stub: &Stub) {
    client.login("u1@example.com", "Secret123").await.unwrap();
    *stub.valid_token.lock().unwrap() = None;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_refresh() {
    let (base, stub) = spawn_stub().await;
    let client = ApiClient::new(base).unwrap();
    logged_in_then_expired(&client, &stub).await;

    let calls = (0..10).map(|_| {
        let client = client.clone();
        async move { client.get::<Data>("/data").await }
    });
    let results = futures::future::join_all(calls).await;

    for r in results {
        assert_eq!(r.expect("request succeeds after refresh").value, 42);
    }
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.access_token().as_deref(), Some("refreshed-1"));
    assert!(!client.coordinator().is_refreshing());
}

#[tokio::test]
async fn replays_only_once() {
    let (base, stub) = spawn_stub().await;
    let client = ApiClient::new(base).unwrap();
    logged_in_then_expired(&client, &stub).await;

    assert_eq!(client.get::<Data>("/data").await.unwrap().value, 42);
    // Original attempt plus exactly one replay.
    assert_eq!(stub.data_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_refresh_ends_session_for_everyone() {
    let (base, stub) = spawn_stub().await;
    let expired = Arc::new(AtomicUsize::new(0));
    let counter = expired.clone();
    let client = ApiClient::builder(base)
        .on_session_expired(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    logged_in_then_expired(&client, &stub).await;
    stub.refresh_fails.store(true, Ordering::SeqCst);

    let calls = (0..5).map(|_| {
        let client = client.clone();
        async move { client.get::<Data>("/data").await }
    });
    for r in futures::future::join_all(calls).await {
        assert!(matches!(r, Err(ClientError::RefreshFailed)), "{r:?}");
    }
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(expired.load(Ordering::SeqCst), 1);
    assert!(client.session().access_token.is_none());
    assert!(client.session().user.is_none());
}

#[tokio::test]
async fn other_errors_pass_through() {
    let (base, stub) = spawn_stub().await;
    let client = ApiClient::new(base).unwrap();
    client.login("u1@example.com", "Secret123").await.unwrap();

    let err = client.get::<Value>("/forbidden").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert_eq!(err.code(), Some("FORBIDDEN"));
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_leader_does_not_wedge_the_queue() {
    let (base, stub) = spawn_stub().await;
    let client = ApiClient::new(base).unwrap();
    logged_in_then_expired(&client, &stub).await;

    // Drop the first caller mid-refresh.
    let first = tokio::time::timeout(Duration::from_millis(50), client.get::<Data>("/data")).await;
    assert!(first.is_err(), "refresh should still be in flight");
    assert!(!client.coordinator().is_refreshing());

    // A fresh caller can lead a new refresh.
    assert_eq!(client.get::<Data>("/data").await.unwrap().value, 42);
}
