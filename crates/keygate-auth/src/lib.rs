//! # keygate-auth
//!
//! Bearer token authentication filter for Keygate services.
//!
//! This crate provides:
//! - An Axum middleware that validates `Authorization: Bearer` tokens
//!   against an identity provider's published JWKS
//! - A TTL-bounded key-set cache with single-flight refresh
//! - Lazy, idempotent resolution of local identity records from the
//!   token's `(iss, sub)` pair
//! - A static allow-list for administrative privilege elevation
//!
//! ## Overview
//!
//! The filter intercepts inbound requests and either rejects them with a
//! structured authentication error or attaches a resolved [`AuthContext`]
//! to request extensions before handing the request to protected handlers.
//! Exempt paths (health checks, static assets) bypass authentication
//! entirely and never trigger a key fetch.
//!
//! ## Modules
//!
//! - [`config`] - Filter configuration (issuer, audience, exempt paths, …)
//! - [`error`] - Authentication error taxonomy
//! - [`keyset`] - JWKS fetching and caching
//! - [`token`] - Token claims and signature verification
//! - [`storage`] - Identity record storage contract and in-memory backend
//! - [`middleware`] - Axum middleware and extractors
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, middleware, routing::get};
//! use keygate_auth::{AuthFilterConfig, AuthState, InMemoryIdentityStorage};
//! use keygate_auth::middleware::token_auth_middleware;
//!
//! let config = AuthFilterConfig {
//!     issuer: "https://idp.example.com/oauth2/default".into(),
//!     audience: "api://keygate".into(),
//!     jwks_url: "https://idp.example.com/oauth2/default/v1/keys".into(),
//!     ..AuthFilterConfig::default()
//! };
//! let state = AuthState::from_config(config, Arc::new(InMemoryIdentityStorage::new()))?;
//!
//! let app: Router = Router::new()
//!     .route("/reports", get(reports_handler))
//!     .layer(middleware::from_fn_with_state(state, token_auth_middleware));
//! ```

pub mod config;
pub mod error;
pub mod keyset;
pub mod middleware;
pub mod storage;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AdminAllowList, AuthFilterConfig, ConfigError, ExemptPaths};
pub use error::{AuthError, InvalidTokenReason};
pub use keyset::{KeySetCache, KeySetConfig, KeySetError};
pub use middleware::{AdminAuth, AuthContext, AuthState, Authenticated, token_auth_middleware};
pub use storage::{IdentityProfile, IdentityRecord, IdentityStorage, InMemoryIdentityStorage};
pub use token::{BearerClaims, TokenVerifier};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
