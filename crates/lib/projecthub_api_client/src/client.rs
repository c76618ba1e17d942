//! ProjectHub API client with a refresh interceptor.
//!
//! Every request carries the in-memory access token. A 401 triggers at most
//! one refresh (shared across concurrent callers via `RefreshCoordinator`)
//! followed by a single replay of the original request.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::coordinator::{RefreshCoordinator, Ticket};
use crate::error::{ClientError, ErrorEnvelope, RefreshError};
use crate::models::{AuthPayload, Envelope, LoginBody, SessionUser};

/// Default outer timeout for every HTTP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const REFRESH_PATH: &str = "/auth/refresh";
const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const ME_PATH: &str = "/auth/me";

/// Paths whose 401s mean "bad credentials", never "refresh and retry".
const NO_REFRESH_PATHS: &[&str] = &[REFRESH_PATH, LOGIN_PATH, "/auth/register"];

type SessionListener = Arc<dyn Fn() + Send + Sync>;

/// In-memory session: the access token and who it belongs to.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub access_token: Option<String>,
    pub user: Option<SessionUser>,
}

struct Inner {
    http: reqwest::Client,
    /// API root, e.g. `http://localhost:5000/api/v1`, without a trailing slash.
    base_url: String,
    session: RwLock<Session>,
    coordinator: RefreshCoordinator,
    on_session_expired: Option<SessionListener>,
}

/// Cheap to clone; clones share session state and the refresh queue.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

/// Builder for `ApiClient`.
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    coordinator: Option<RefreshCoordinator>,
    on_session_expired: Option<SessionListener>,
}

impl ApiClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a coordinator (e.g. across clients for the same session).
    pub fn coordinator(mut self, coordinator: RefreshCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Called once whenever a refresh fails and the session is cleared.
    pub fn on_session_expired(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(self.base_url));
        }
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()?;
        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                session: RwLock::new(Session::default()),
                coordinator: self.coordinator.unwrap_or_default(),
                on_session_expired: self.on_session_expired,
            }),
        })
    }
}

impl ApiClient {
    /// Start building a client for the API rooted at `base_url`
    /// (e.g. `http://localhost:5000/api/v1`).
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            coordinator: None,
            on_session_expired: None,
        }
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder(base_url).build()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    // -----------------------------------------------------------------------
    // Session state
    // -----------------------------------------------------------------------

    pub fn session(&self) -> Session {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// Install a session token. A refresh leader settles its token after
    /// this, so only tokens set from elsewhere (login) drop the remembered one.
    pub fn set_session(&self, access_token: String, user: Option<SessionUser>) {
        self.inner.coordinator.forget_token();
        let mut session = self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        session.access_token = Some(access_token);
        if user.is_some() {
            session.user = user;
        }
    }

    pub fn clear_session(&self) {
        self.inner.coordinator.forget_token();
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Session::default();
    }

    // -----------------------------------------------------------------------
    // Auth endpoints
    // -----------------------------------------------------------------------

    /// Log in and keep the access token; the refresh token lands in the cookie store.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, ClientError> {
        let payload: AuthPayload = self
            .post(LOGIN_PATH, &LoginBody { email, password })
            .await?;
        self.set_session(payload.access_token, Some(payload.user.clone()));
        info!(user_id = %payload.user.id, "logged in");
        Ok(payload.user)
    }

    /// Revoke the refresh token server-side and forget the session. The local
    /// session is cleared even when the call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .execute(Method::POST, LOGOUT_PATH, None::<&()>)
            .await
            .and_then(|resp| {
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(ClientError::Api {
                        status: resp.status(),
                        envelope: ErrorEnvelope::from_status(resp.status(), b""),
                    })
                }
            });
        self.clear_session();
        result
    }

    pub async fn me(&self) -> Result<SessionUser, ClientError> {
        let user: SessionUser = self.get(ME_PATH).await?;
        let mut session = self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        session.user = Some(user.clone());
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Generic requests (unwrap the success envelope's `data`)
    // -----------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let resp = self.execute(method, path, body).await?;
        decode(resp).await
    }

    /// Send with the current token; on 401 refresh once and replay once.
    pub async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        let sent = self.access_token();
        let resp = self.dispatch(&method, path, body, sent.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED || NO_REFRESH_PATHS.contains(&path) {
            return Ok(resp);
        }

        let current = self.access_token();
        let token = if current != sent {
            // Someone else refreshed (or the session ended) while we were in flight.
            match current {
                Some(token) => token,
                None => return Err(ClientError::RefreshFailed),
            }
        } else {
            self.refresh_from(sent.as_deref()).await?
        };

        debug!(%method, path, "replaying after refresh");
        self.dispatch(&method, path, body, Some(&token)).await
    }

    /// Obtain a new access token, joining an in-flight refresh if there is one.
    pub async fn refresh_access_token(&self) -> Result<String, ClientError> {
        let held = self.access_token();
        self.refresh_from(held.as_deref()).await
    }

    /// Replace `sent`, unless a refresh has already done so.
    async fn refresh_from(&self, sent: Option<&str>) -> Result<String, ClientError> {
        let guard = match self.inner.coordinator.begin(sent) {
            Ticket::Ready(token) => return Ok(token),
            Ticket::Waiter(waiter) => return waiter.wait().await.map_err(ClientError::from),
            Ticket::Leader(guard) => guard,
        };

        match self.call_refresh().await {
            Ok(payload) => {
                let token = payload.access_token;
                self.set_session(token.clone(), Some(payload.user));
                guard.settle(Ok(token.clone()));
                debug!("access token refreshed");
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                guard.settle(Err(RefreshError::Failed));
                self.expire_session();
                Err(ClientError::RefreshFailed)
            }
        }
    }

    async fn call_refresh(&self) -> Result<AuthPayload, ClientError> {
        let resp = self
            .dispatch(&Method::POST, REFRESH_PATH, None::<&()>, None)
            .await?;
        decode(resp).await
    }

    fn expire_session(&self) {
        self.clear_session();
        if let Some(listener) = &self.inner.on_session_expired {
            listener();
        }
    }

    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let mut req = self.inner.http.request(method.clone(), url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if status.is_success() {
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::Decode(format!("{status} response: {e}")))?;
        Ok(envelope.data)
    } else {
        let envelope = serde_json::from_slice::<ErrorEnvelope>(&bytes)
            .unwrap_or_else(|_| ErrorEnvelope::from_status(status, &bytes));
        Err(ClientError::Api { status, envelope })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(ApiClient::new("http://localhost:5000/api/v1/").is_ok());
    }

    #[test]
    fn session_state_roundtrip() {
        let client = ApiClient::new("http://localhost:5000/api/v1").unwrap();
        assert!(client.access_token().is_none());
        client.set_session("abc".into(), None);
        assert_eq!(client.access_token().as_deref(), Some("abc"));
        client.clear_session();
        assert!(client.session().access_token.is_none());
    }
}
