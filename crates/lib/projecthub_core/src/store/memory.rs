//! In-memory store implementations for tests and single-process development.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{Cache, CredentialStore, StoreError};
use crate::models::auth::{AuditEntry, NewUser, RefreshTokenRecord, User, UserUpdate};
use crate::uuid::uuidv7;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    audit_log: Vec<AuditEntry>,
}

/// `CredentialStore` backed by a mutex-guarded pair of hash maps.
///
/// Every operation holds the lock for its whole body, which makes
/// `delete_refresh_token` a true compare-and-delete.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of live refresh-token records for a user.
    pub fn refresh_token_count(&self, user_id: &str) -> usize {
        self.lock()
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    /// Recorded audit entries, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.lock().audit_log.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Conflict("email".into()));
        }
        if tables.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::Conflict("username".into()));
        }
        let user = User {
            id: uuidv7().to_string(),
            email: new_user.email,
            username: new_user.username,
            full_name: new_user.full_name,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_verified: false,
            is_active: true,
            is_banned: false,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: &str,
        update: UserUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.lock();
        let Some(user) = tables.users.get_mut(id) else {
            return Ok(None);
        };
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(v) = update.is_verified {
            user.is_verified = v;
        }
        if let Some(v) = update.is_active {
            user.is_active = v;
        }
        if let Some(v) = update.is_banned {
            user.is_banned = v;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let removed = tables.users.remove(id).is_some();
        tables.refresh_tokens.retain(|_, r| r.user_id != id);
        Ok(removed)
    }

    async fn create_refresh_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let mut tables = self.lock();
        if tables
            .refresh_tokens
            .values()
            .any(|r| r.token_hash == token_hash)
        {
            return Err(StoreError::Conflict("token_hash".into()));
        }
        let record = RefreshTokenRecord {
            id: uuidv7().to_string(),
            user_id: user_id.to_string(),
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        tables
            .refresh_tokens
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self
            .lock()
            .refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn delete_refresh_token(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().refresh_tokens.remove(id).is_some())
    }

    async fn delete_refresh_token_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, r| r.token_hash != token_hash);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, r| r.user_id != user_id);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.lock().audit_log.push(entry);
        Ok(())
    }
}

/// A cached entry with optional expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// In-memory TTL cache. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        self.entries.retain(|_, e| e.is_live());
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let live = self
            .entries
            .get(key)
            .map(|e| e.is_live().then(|| e.value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, e| !e.is_live());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .remove(key)
            .and_then(|(_, e)| e.is_live().then_some(e.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.into(),
            full_name: None,
            password_hash: "hash".into(),
            role: Role::FreeUser,
        }
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.io", "alice")).await.unwrap();
        assert!(user.is_active);
        assert!(!user.is_banned);
        assert!(!user.is_verified);
        assert_eq!(
            store.find_user_by_id(&user.id).await.unwrap().unwrap().email,
            "a@x.io"
        );
        assert!(store.find_user_by_email("a@x.io").await.unwrap().is_some());
        assert!(store.find_user_by_username("alice").await.unwrap().is_some());
        assert!(store.find_user_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let store = MemoryCredentialStore::new();
        store.create_user(new_user("a@x.io", "alice")).await.unwrap();
        let err = store
            .create_user(new_user("a@x.io", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(f) if f == "email"));
        let err = store
            .create_user(new_user("b@x.io", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(f) if f == "username"));
    }

    #[tokio::test]
    async fn update_user_applies_only_set_fields() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.io", "alice")).await.unwrap();
        let updated = store
            .update_user(
                &user.id,
                UserUpdate {
                    is_banned: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_banned);
        assert_eq!(updated.password_hash, "hash");
        assert!(
            store
                .update_user("missing", UserUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_refresh_token_is_compare_and_delete() {
        let store = MemoryCredentialStore::new();
        let record = store
            .create_refresh_token("u1", "h1", Utc::now())
            .await
            .unwrap();
        assert!(store.delete_refresh_token(&record.id).await.unwrap());
        assert!(!store.delete_refresh_token(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_user_cascades_refresh_tokens() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.io", "alice")).await.unwrap();
        store
            .create_refresh_token(&user.id, "h1", Utc::now())
            .await
            .unwrap();
        store
            .create_refresh_token(&user.id, "h2", Utc::now())
            .await
            .unwrap();
        assert_eq!(store.refresh_token_count(&user.id), 2);
        assert!(store.delete_user(&user.id).await.unwrap());
        assert_eq!(store.refresh_token_count(&user.id), 0);
    }

    #[tokio::test]
    async fn delete_by_hash_is_idempotent() {
        let store = MemoryCredentialStore::new();
        store
            .create_refresh_token("u1", "h1", Utc::now())
            .await
            .unwrap();
        assert_eq!(store.delete_refresh_token_by_hash("h1").await.unwrap(), 1);
        assert_eq!(store.delete_refresh_token_by_hash("h1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn audit_entries_are_kept_in_order() {
        use crate::models::auth::AuditAction;

        let store = MemoryCredentialStore::new();
        store
            .record_audit(AuditEntry::user("admin", AuditAction::BanUser, "u1"))
            .await
            .unwrap();
        store
            .record_audit(AuditEntry::user("admin", AuditAction::UnbanUser, "u1"))
            .await
            .unwrap();
        let log = store.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, AuditAction::BanUser);
        assert_eq!(log[1].entity, "User");
    }

    #[tokio::test]
    async fn cache_set_get_del() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.del("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_expired_entry_returns_none() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Some(Duration::ZERO)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.take("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_take_removes() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.take("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.take("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_evicts_expired() {
        let cache = MemoryCache::new();
        cache.set("dead", "v", Some(Duration::ZERO)).await.unwrap();
        cache.set("live", "v", None).await.unwrap();
        cache.cleanup();
        assert_eq!(cache.entries.len(), 1);
    }
}
