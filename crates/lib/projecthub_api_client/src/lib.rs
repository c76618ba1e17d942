//! # projecthub_api_client
//!
//! HTTP client for the ProjectHub API. Requests carry the in-memory access
//! token; an expired token is renewed through a single shared refresh and the
//! request is replayed once.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod models;

pub use client::{ApiClient, ApiClientBuilder, Session};
pub use coordinator::{RefreshCoordinator, Ticket};
pub use error::{ClientError, ErrorEnvelope, RefreshError};
pub use models::SessionUser;
