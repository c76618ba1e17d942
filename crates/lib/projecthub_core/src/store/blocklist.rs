//! Typed views over the shared cache: the ban blocklist and one-time tokens.

use std::sync::Arc;
use std::time::Duration;

use super::{Cache, StoreError};
use crate::auth::tokens::{generate_token, hash_token};

/// How long a ban marker lives in the blocklist: 1 year.
pub const BAN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Email verification token lifetime: 24 hours.
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Password reset token lifetime: 1 hour.
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Banned-user markers keyed `blocklist:{user_id}`.
#[derive(Clone)]
pub struct Blocklist {
    cache: Arc<dyn Cache>,
}

impl Blocklist {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(user_id: &str) -> String {
        format!("blocklist:{user_id}")
    }

    pub async fn add(&self, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.cache.set(&Self::key(user_id), "1", Some(ttl)).await
    }

    pub async fn check(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.cache.get(&Self::key(user_id)).await?.as_deref() == Some("1"))
    }

    pub async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        self.cache.del(&Self::key(user_id)).await
    }
}

/// Purpose of a one-time token; doubles as the cache key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    fn prefix(&self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify",
            TokenPurpose::ResetPassword => "reset",
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::VerifyEmail => VERIFICATION_TOKEN_TTL,
            TokenPurpose::ResetPassword => RESET_TOKEN_TTL,
        }
    }
}

/// Single-use tokens for email verification and password reset.
/// Only the SHA-256 of the raw token is used as the key.
#[derive(Clone)]
pub struct OneTimeTokens {
    cache: Arc<dyn Cache>,
}

impl OneTimeTokens {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(purpose: TokenPurpose, raw: &str) -> String {
        format!("{}:{}", purpose.prefix(), hash_token(raw))
    }

    /// Mint a token bound to `user_id`, returning the raw token.
    pub async fn issue(&self, purpose: TokenPurpose, user_id: &str) -> Result<String, StoreError> {
        let raw = generate_token();
        self.cache
            .set(&Self::key(purpose, &raw), user_id, Some(purpose.ttl()))
            .await?;
        Ok(raw)
    }

    /// Consume a token, returning the bound user ID if it was live.
    pub async fn consume(
        &self,
        purpose: TokenPurpose,
        raw: &str,
    ) -> Result<Option<String>, StoreError> {
        self.cache.take(&Self::key(purpose, raw)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCache;

    #[tokio::test]
    async fn blocklist_add_check_remove() {
        let blocklist = Blocklist::new(Arc::new(MemoryCache::new()));
        assert!(!blocklist.check("u1").await.unwrap());
        blocklist.add("u1", BAN_TTL).await.unwrap();
        assert!(blocklist.check("u1").await.unwrap());
        assert!(!blocklist.check("u2").await.unwrap());
        blocklist.remove("u1").await.unwrap();
        assert!(!blocklist.check("u1").await.unwrap());
    }

    #[tokio::test]
    async fn blocklist_entry_expires() {
        let blocklist = Blocklist::new(Arc::new(MemoryCache::new()));
        blocklist.add("u1", Duration::ZERO).await.unwrap();
        assert!(!blocklist.check("u1").await.unwrap());
    }

    #[tokio::test]
    async fn one_time_token_is_single_use() {
        let tokens = OneTimeTokens::new(Arc::new(MemoryCache::new()));
        let raw = tokens.issue(TokenPurpose::ResetPassword, "u1").await.unwrap();
        assert_eq!(
            tokens
                .consume(TokenPurpose::ResetPassword, &raw)
                .await
                .unwrap()
                .as_deref(),
            Some("u1")
        );
        assert!(
            tokens
                .consume(TokenPurpose::ResetPassword, &raw)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn one_time_token_purposes_do_not_mix() {
        let tokens = OneTimeTokens::new(Arc::new(MemoryCache::new()));
        let raw = tokens.issue(TokenPurpose::VerifyEmail, "u1").await.unwrap();
        assert!(
            tokens
                .consume(TokenPurpose::ResetPassword, &raw)
                .await
                .unwrap()
                .is_none()
        );
    }
}
