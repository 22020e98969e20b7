//! Axum middleware and extractors for the authentication filter.
//!
//! - [`token_auth_middleware`] - the filter itself, applied with
//!   `axum::middleware::from_fn_with_state`
//! - [`Authenticated`] - extractor handing the resolved [`AuthContext`] to
//!   handlers behind the filter
//! - [`AdminAuth`] - extractor gating administrative endpoints on the
//!   allow-list

pub mod admin;
pub mod auth;
pub mod error;
pub mod types;

pub use admin::AdminAuth;
pub use auth::{AuthState, Authenticated, token_auth_middleware};
pub use types::AuthContext;
