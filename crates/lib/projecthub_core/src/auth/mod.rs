//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT issuance and rotation, the per-request
//! authentication gate, and role/ownership policies shared by `projecthub_api`.

pub mod authority;
pub mod gate;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod tokens;
pub mod validation;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    CredentialError,

    /// Missing bearer credentials or authentication required.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    /// A correctly signed token of the other kind (refresh used as access, etc.).
    #[error("Invalid token type")]
    WrongTokenType,

    #[error("{0}")]
    NotFound(String),

    /// A persisted record (refresh token) is past its expiry.
    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Validation failed")]
    ValidationError(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
