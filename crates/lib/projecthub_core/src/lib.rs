//! # projecthub_core
//!
//! Core domain logic for ProjectHub: token issuance and rotation, the
//! authentication gate, authorization policies, and the credential/cache
//! collaborators they run against.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
