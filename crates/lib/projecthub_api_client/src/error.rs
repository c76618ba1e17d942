//! Client error types.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A field-level validation failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldDetail>>,
}

/// The server's `{success: false, error, meta}` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub success: bool,
    pub error: ErrorDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Stand-in for error bodies that are not an envelope (proxies, crashes).
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let message = if text.trim().is_empty() {
            status.canonical_reason().unwrap_or("Request failed").to_string()
        } else {
            text.into_owned()
        };
        Self {
            success: false,
            error: ErrorDetail {
                code: format!("HTTP_{}", status.as_u16()),
                message,
                details: None,
            },
            meta: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.error.code
    }
}

/// Why a refresh did not produce a token. Shared with every queued waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("refresh rejected")]
    Failed,
    #[error("refresh abandoned before completing")]
    Aborted,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-success response that was not resolved by a refresh.
    #[error("API error {status}: {}", envelope.error.message)]
    Api {
        status: StatusCode,
        envelope: ErrorEnvelope,
    },

    /// The session could not be renewed; the caller must log in again.
    #[error("Session expired")]
    RefreshFailed,

    /// The refresh this request was waiting on was cancelled or reset.
    #[error("Token refresh aborted")]
    RefreshAborted,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Envelope error code for `Api` errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { envelope, .. } => Some(envelope.code()),
            _ => None,
        }
    }
}

impl From<RefreshError> for ClientError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Failed => ClientError::RefreshFailed,
            RefreshError::Aborted => ClientError::RefreshAborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_envelope() {
        let body = br#"{"success":false,"error":{"code":"TOKEN_EXPIRED","message":"Token expired"},"meta":{"timestamp":"t"}}"#;
        let env: ErrorEnvelope = serde_json::from_slice(body).unwrap();
        assert_eq!(env.code(), "TOKEN_EXPIRED");
        assert!(env.error.details.is_none());
    }

    #[test]
    fn non_envelope_bodies_get_a_synthetic_code() {
        let env = ErrorEnvelope::from_status(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(env.code(), "HTTP_502");
        assert_eq!(env.error.message, "Bad Gateway");
    }
}
