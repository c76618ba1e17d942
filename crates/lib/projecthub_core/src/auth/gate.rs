//! Authentication gate — turns a bearer credential into a live `Principal`.
//!
//! Order of checks: bearer present → access token verifies → blocklist miss →
//! user exists → user active and not banned. The first failing check decides
//! the outcome; nothing is retried.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::authority::TokenAuthority;
use crate::models::auth::Principal;
use crate::store::{Blocklist, CredentialStore};

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Everything needed to authenticate a request.
#[derive(Clone)]
pub struct AuthGate {
    authority: TokenAuthority,
    blocklist: Blocklist,
    credentials: Arc<dyn CredentialStore>,
}

impl AuthGate {
    pub fn new(
        authority: TokenAuthority,
        blocklist: Blocklist,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            authority,
            blocklist,
            credentials,
        }
    }

    /// Mandatory authentication. Every rejection is surfaced.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization)
            .ok_or_else(|| AuthError::Unauthenticated("Access token required".into()))?;

        let claims = self.authority.verify_access(token)?;

        if self.blocklist.check(&claims.user_id).await? {
            debug!(user_id = %claims.user_id, "rejected: user is on the blocklist");
            return Err(AuthError::Forbidden("Account has been suspended".into()));
        }

        // Claims only route the lookup; the principal comes from the store.
        let user = self
            .credentials
            .find_user_by_id(&claims.user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated("User not found".into()))?;

        if !user.is_active {
            return Err(AuthError::Forbidden("Account is deactivated".into()));
        }
        if user.is_banned {
            return Err(AuthError::Forbidden("Account has been banned".into()));
        }

        Ok(Principal::from(&user))
    }

    /// Optional authentication. Never fails: any rejection yields `None`.
    pub async fn authenticate_optional(&self, authorization: Option<&str>) -> Option<Principal> {
        bearer_token(authorization)?;
        match self.authenticate(authorization).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                debug!(error = %e, "optional auth: continuing anonymously");
                None
            }
        }
    }
}
