//! Credential input rules shared by the request types that derive
//! `validator::Validate`, plus the mapping from `ValidationErrors` to
//! field-level `FieldError`s.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::{ValidationError, ValidationErrors};

use super::{AuthError, FieldError};

/// Letters, digits, underscores and hyphens. Length is checked separately.
pub static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("username pattern compiles"));

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// At least one lowercase letter, one uppercase letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if lower && upper && digit {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength").with_message(Cow::Borrowed(
            "Password must contain at least one uppercase letter, one lowercase letter, and one number",
        )))
    }
}

/// `full_name` -> `fullName`, matching the wire format.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten `ValidationErrors` into field errors, ordered by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = camel_case(field.as_ref());
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_deref()
                    .map(str::to_owned)
                    .unwrap_or_else(|| e.code.to_string());
                FieldError::new(field.clone(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        AuthError::ValidationError(field_errors(&errors))
    }
}

/// Turn collected errors into a result.
pub fn finish(errors: Vec<FieldError>) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::ValidationError(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email address"))]
        email: String,
        #[validate(
            length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
            regex(path = *USERNAME_REGEX, message = "Invalid username")
        )]
        username: String,
        #[validate(
            length(min = 8, message = "Password must be at least 8 characters"),
            custom(function = "validate_password_strength")
        )]
        new_password: String,
    }

    fn signup(email: &str, username: &str, password: &str) -> Signup {
        Signup {
            email: email.into(),
            username: username.into(),
            new_password: password.into(),
        }
    }

    fn fields(s: &Signup) -> Vec<String> {
        match s.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e).into_iter().map(|f| f.field).collect(),
        }
    }

    #[test]
    fn accepts_well_formed_input() {
        assert!(fields(&signup("dev@example.com", "dev_user-1", "Secret123")).is_empty());
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in ["nope", "a b@c.io", "a@b..c", "@example.com"] {
            assert_eq!(fields(&signup(email, "dev", "Secret123")), ["email"], "{email}");
        }
    }

    #[test]
    fn username_charset_and_length() {
        assert_eq!(fields(&signup("a@x.io", "ab", "Secret123")), ["username"]);
        assert_eq!(fields(&signup("a@x.io", "bad name", "Secret123")), ["username"]);
        assert_eq!(fields(&signup("a@x.io", &"x".repeat(31), "Secret123")), ["username"]);
    }

    #[test]
    fn password_reports_length_and_strength_under_camel_case_key() {
        let s = signup("a@x.io", "dev", "abc");
        let errors = field_errors(&s.validate().unwrap_err());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.field == "newPassword"));
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("Secret123").is_ok());
    }

    #[test]
    fn converts_into_auth_error() {
        let err = AuthError::from(signup("nope", "dev", "Secret123").validate().unwrap_err());
        assert!(matches!(err, AuthError::ValidationError(v) if v[0].message == "Invalid email address"));
    }

    #[test]
    fn normalizes_and_finishes() {
        assert_eq!(normalize_email("  Dev@Example.COM "), "dev@example.com");
        assert!(finish(Vec::new()).is_ok());
        assert!(matches!(
            finish(vec![FieldError::new("f", "m")]),
            Err(AuthError::ValidationError(v)) if v.len() == 1
        ));
    }
}
