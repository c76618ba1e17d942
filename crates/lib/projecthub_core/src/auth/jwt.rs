//! JWT signing, decoding, and secret/expiry resolution.

use std::path::PathBuf;

use chrono::Duration;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

use super::AuthError;
use crate::models::auth::TokenClaims;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_EXPIRY: &str = "15m";

/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_EXPIRY: &str = "7d";

/// Sign claims with HS256.
pub fn sign(claims: &TokenClaims, secret: &[u8]) -> Result<String, AuthError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

/// Decode and validate signature + expiry. No leeway: an expired token is expired.
pub fn decode_claims(token: &str, secret: &[u8]) -> Result<TokenClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    decode::<TokenClaims>(token, &key, &validation).map(|data| data.claims)
}

/// Map a decode failure onto the auth taxonomy.
pub fn classify(err: &JwtError) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    }
}

/// Whether a decode failure was a signature mismatch (as opposed to malformed input).
pub fn is_signature_mismatch(err: &JwtError) -> bool {
    matches!(err.kind(), ErrorKind::InvalidSignature)
}

/// Parse an expiry such as `"30s"`, `"15m"`, `"12h"` or `"7d"`. A bare number is seconds.
pub fn parse_expiry(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty duration".into());
    }
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        _ => (value, None),
    };
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    if amount <= 0 {
        return Err(format!("duration must be positive: {value}"));
    }
    match unit {
        None | Some('s') => Ok(Duration::seconds(amount)),
        Some('m') => Ok(Duration::minutes(amount)),
        Some('h') => Ok(Duration::hours(amount)),
        Some('d') => Ok(Duration::days(amount)),
        Some(other) => Err(format!("unknown duration unit '{other}' in {value}")),
    }
}

/// Resolve a signing secret: env var `var` → persisted file `file_name` → generate and persist.
pub fn resolve_secret(var: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(var)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), var, "generated new JWT secret");
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("projecthub")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{Role, TokenKind};

    fn claims(exp_offset: i64) -> TokenClaims {
        let now = chrono::Utc::now().timestamp();
        TokenClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            role: Role::Buyer,
            kind: TokenKind::Access,
            jti: None,
            iat: now,
            exp: now + exp_offset,
        }
    }

    #[test]
    fn parse_expiry_units() {
        assert_eq!(parse_expiry("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_expiry("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_expiry("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_expiry("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_expiry("90").unwrap(), Duration::seconds(90));
    }

    #[test]
    fn parse_expiry_rejects_garbage() {
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("m").is_err());
        assert!(parse_expiry("5w").is_err());
        assert!(parse_expiry("-5m").is_err());
        assert!(parse_expiry("0s").is_err());
    }

    #[test]
    fn sign_and_decode() {
        let token = sign(&claims(60), b"secret").unwrap();
        let decoded = decode_claims(&token, b"secret").unwrap();
        assert_eq!(decoded.user_id, "u1");
        assert_eq!(decoded.kind, TokenKind::Access);
    }

    #[test]
    fn expired_token_classified_as_expired() {
        let token = sign(&claims(-10), b"secret").unwrap();
        let err = decode_claims(&token, b"secret").unwrap_err();
        assert!(matches!(classify(&err), AuthError::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_signature_mismatch() {
        let token = sign(&claims(60), b"secret").unwrap();
        let err = decode_claims(&token, b"other").unwrap_err();
        assert!(is_signature_mismatch(&err));
        assert!(matches!(classify(&err), AuthError::TokenInvalid));
    }

    #[test]
    fn garbage_is_invalid() {
        let err = decode_claims("not.a.jwt", b"secret").unwrap_err();
        assert!(!is_signature_mismatch(&err));
        assert!(matches!(classify(&err), AuthError::TokenInvalid));
    }
}
