//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API-facing DTOs in
//! `projecthub_api::models` (which carry `#[serde(rename_all = "camelCase")]`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace role. Serialized as snake_case, e.g. `"super_admin"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Seller,
    Buyer,
    Freelancer,
    PaidUser,
    FreeUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Seller => "seller",
            Role::Buyer => "buyer",
            Role::Freelancer => "freelancer",
            Role::PaidUser => "paid_user",
            Role::FreeUser => "free_user",
        }
    }

    /// Whether this role bypasses ownership checks.
    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.contains(self)
    }

    /// Whether a user may pick this role for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        matches!(
            self,
            Role::Seller | Role::Buyer | Role::Freelancer | Role::FreeUser
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "seller" => Ok(Role::Seller),
            "buyer" => Ok(Role::Buyer),
            "freelancer" => Ok(Role::Freelancer),
            "paid_user" => Ok(Role::PaidUser),
            "free_user" => Ok(Role::FreeUser),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

pub const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin];
pub const SELLER_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::Seller];
pub const BUYER_ROLES: &[Role] = &[
    Role::SuperAdmin,
    Role::Admin,
    Role::Buyer,
    Role::PaidUser,
    Role::FreeUser,
];
pub const FREELANCER_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::Freelancer];
pub const PAID_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::PaidUser, Role::Seller];

/// Persisted user record, including the password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update applied by `CredentialStore::update_user`.
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub is_banned: Option<bool>,
}

/// The authenticated caller, rebuilt from the credential store on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_banned: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
            is_verified: user.is_verified,
            is_active: user.is_active,
            is_banned: user.is_banned,
        }
    }
}

/// Refresh token record stored in the database. Only the hash is kept.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Token kind discriminator carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject user ID.
    pub user_id: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Random nonce; present on refresh tokens so each one hashes uniquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Freshly minted access + refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Administrative action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    BanUser,
    UnbanUser,
    VerifyUser,
    DeleteUser,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BanUser => "BAN_USER",
            AuditAction::UnbanUser => "UNBAN_USER",
            AuditAction::VerifyUser => "VERIFY_USER",
            AuditAction::DeleteUser => "DELETE_USER",
        }
    }
}

/// One audit log row: who did what to which entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: String,
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: String,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// An action on a user account, without metadata.
    pub fn user(actor_id: &str, action: AuditAction, user_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            action,
            entity: "User".to_string(),
            entity_id: user_id.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrips_through_str() {
        for role in [
            Role::SuperAdmin,
            Role::Admin,
            Role::Seller,
            Role::Buyer,
            Role::Freelancer,
            Role::PaidUser,
            Role::FreeUser,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn only_admin_roles_are_admin() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Seller.is_admin());
        assert!(!Role::FreeUser.is_admin());
    }

    #[test]
    fn admin_roles_are_not_self_assignable() {
        assert!(!Role::Admin.is_self_assignable());
        assert!(!Role::SuperAdmin.is_self_assignable());
        assert!(!Role::PaidUser.is_self_assignable());
        assert!(Role::Buyer.is_self_assignable());
    }

    #[test]
    fn claims_serialize_type_tag() {
        let claims = TokenClaims {
            user_id: "u1".into(),
            email: "a@b.c".into(),
            role: Role::Buyer,
            kind: TokenKind::Access,
            jti: None,
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "access");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["role"], "buyer");
        assert!(json.get("jti").is_none());
    }
}
