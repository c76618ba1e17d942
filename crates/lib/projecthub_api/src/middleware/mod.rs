//! Request middleware.

pub mod auth;
pub mod authorize;
pub mod rate_limit;
pub mod request_id;
