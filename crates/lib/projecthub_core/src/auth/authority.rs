//! Token Authority: mints, verifies, and rotates access/refresh token pairs.
//!
//! Access tokens are stateless and verified by signature, expiry and type tag
//! alone. Refresh tokens are additionally backed by a hashed, single-use
//! `RefreshTokenRecord`; rotating one consumes its record.

use chrono::{Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::AuthError;
use super::jwt::{classify, decode_claims, is_signature_mismatch, sign};
use super::tokens::hash_token;
use crate::models::auth::{Role, TokenClaims, TokenKind, TokenPair, User};
use crate::store::CredentialStore;

/// Signs and verifies tokens with kind-specific secrets and lifetimes.
#[derive(Clone)]
pub struct TokenAuthority {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(
        access_secret: impl Into<Vec<u8>>,
        refresh_secret: impl Into<Vec<u8>>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn mint(
        &self,
        kind: TokenKind,
        user_id: &str,
        email: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let (ttl, jti) = match kind {
            TokenKind::Access => (self.access_ttl, None),
            TokenKind::Refresh => (self.refresh_ttl, Some(Uuid::new_v4().to_string())),
        };
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role,
            kind,
            jti,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        sign(&claims, self.secret(kind))
    }

    /// Sign a new access/refresh pair. Persisting the refresh hash is the caller's job
    /// (see [`TokenAuthority::start_session`]).
    pub fn issue(&self, user_id: &str, email: &str, role: Role) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.mint(TokenKind::Access, user_id, email, role)?,
            refresh_token: self.mint(TokenKind::Refresh, user_id, email, role)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, AuthError> {
        match decode_claims(token, self.secret(expected)) {
            Ok(claims) if claims.kind == expected => Ok(claims),
            Ok(_) => Err(AuthError::WrongTokenType),
            Err(e) if is_signature_mismatch(&e) => {
                // Distinguish "valid token of the other kind" from a forgery.
                let other = match expected {
                    TokenKind::Access => TokenKind::Refresh,
                    TokenKind::Refresh => TokenKind::Access,
                };
                match decode_claims(token, self.secret(other)) {
                    Ok(claims) if claims.kind == other => Err(AuthError::WrongTokenType),
                    _ => Err(AuthError::TokenInvalid),
                }
            }
            Err(e) => Err(classify(&e)),
        }
    }

    /// Issue a pair for `user` and persist the refresh token's hash.
    pub async fn start_session(
        &self,
        store: &dyn CredentialStore,
        user: &User,
    ) -> Result<TokenPair, AuthError> {
        let pair = self.issue(&user.id, &user.email, user.role)?;
        let expires_at = Utc::now() + self.refresh_ttl;
        store
            .create_refresh_token(&user.id, &hash_token(&pair.refresh_token), expires_at)
            .await?;
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, consuming the old record.
    ///
    /// The consumed record is removed with a compare-and-delete; of several
    /// concurrent rotations of the same token exactly one can succeed and the
    /// others fail with `NotFound`.
    pub async fn rotate(
        &self,
        store: &dyn CredentialStore,
        raw_refresh_token: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let claims = self.verify_refresh(raw_refresh_token)?;
        let token_hash = hash_token(raw_refresh_token);

        let Some(record) = store.find_refresh_token_by_hash(&token_hash).await? else {
            warn!(user_id = %claims.user_id, "refresh token not found (revoked or replayed)");
            return Err(AuthError::NotFound("Refresh token not found".into()));
        };

        if record.user_id != claims.user_id {
            warn!(record_user = %record.user_id, claim_user = %claims.user_id, "refresh token owner mismatch");
            return Err(AuthError::TokenInvalid);
        }

        if record.expires_at < Utc::now() {
            store.delete_refresh_token(&record.id).await?;
            debug!(user_id = %record.user_id, "expired refresh token record removed");
            return Err(AuthError::Expired("Refresh token expired".into()));
        }

        if !store.delete_refresh_token(&record.id).await? {
            warn!(user_id = %record.user_id, "refresh token consumed by a concurrent rotation");
            return Err(AuthError::NotFound("Refresh token not found".into()));
        }

        let user = store
            .find_user_by_id(&record.user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        if user.is_banned {
            return Err(AuthError::Forbidden("Account has been banned".into()));
        }
        if !user.is_active {
            return Err(AuthError::Forbidden("Account is deactivated".into()));
        }

        let pair = self.start_session(store, &user).await?;
        debug!(user_id = %user.id, "refresh token rotated");
        Ok((user, pair))
    }

    /// Delete the record for a raw refresh token. Unknown tokens are ignored.
    pub async fn revoke(
        &self,
        store: &dyn CredentialStore,
        raw_refresh_token: &str,
    ) -> Result<(), AuthError> {
        store
            .delete_refresh_token_by_hash(&hash_token(raw_refresh_token))
            .await?;
        Ok(())
    }

    /// Delete every refresh-token record for a user, ending all their sessions.
    pub async fn revoke_all(
        &self,
        store: &dyn CredentialStore,
        user_id: &str,
    ) -> Result<u64, AuthError> {
        Ok(store.delete_refresh_tokens_for_user(user_id).await?)
    }
}
