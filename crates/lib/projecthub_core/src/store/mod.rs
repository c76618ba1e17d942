//! Persistence collaborators consumed by the auth core.
//!
//! `CredentialStore` holds users and refresh-token records; `Cache` is the
//! shared key-value store with TTL that backs the ban blocklist and one-time
//! tokens. Each has an in-memory and a PostgreSQL implementation.

pub mod blocklist;
pub mod memory;
pub mod pg;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{AuditEntry, NewUser, RefreshTokenRecord, User, UserUpdate};

pub use blocklist::{Blocklist, OneTimeTokens};
pub use memory::{MemoryCache, MemoryCredentialStore};
pub use pg::{PgCache, PgCredentialStore};

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated; carries the constraint or field name.
    #[error("Duplicate value for {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Users and refresh-token records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user. Duplicate email or username fails with `StoreError::Conflict`.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Apply a partial update, returning the updated user (or `None` if absent).
    async fn update_user(&self, id: &str, update: UserUpdate)
    -> Result<Option<User>, StoreError>;

    /// Delete a user and, with it, all of their refresh tokens.
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;

    async fn create_refresh_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError>;

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Compare-and-delete by record ID. Returns `true` only for the caller that
    /// actually removed the record; concurrent callers racing on the same ID
    /// see `false`.
    async fn delete_refresh_token(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete by token hash. Deleting an absent hash is not an error.
    async fn delete_refresh_token_by_hash(&self, token_hash: &str) -> Result<u64, StoreError>;

    async fn delete_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Append an administrative action to the audit log.
    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
}

/// Shared key-value cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Insert or replace a value. `None` TTL never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Get a live (unexpired) value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Remove and return a live value in one step. Two concurrent takers of the
    /// same key never both receive it.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;
}
