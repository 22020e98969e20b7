//! Admin extractor.
//!
//! Gates administrative endpoints on the allow-list-derived admin flag.
//! Privilege comes exclusively from the static allow-list evaluated by the
//! filter against *verified* claims — there is no header, scope or role a
//! client can send to obtain it.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Json, Router, routing::get};
//! use keygate_auth::middleware::AdminAuth;
//!
//! async fn admin_handler(admin: AdminAuth) -> Json<String> {
//!     Json(format!("hello {}", admin.subject))
//! }
//! ```

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AuthError;

use super::types::AuthContext;

/// Admin authentication context.
///
/// Extracting this succeeds only for requests that passed the filter with
/// an allow-listed subject or email.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// The verified subject.
    pub subject: String,

    /// The verified email claim, if present.
    pub email: Option<String>,

    /// The resolved local identity identifier.
    pub identity_id: uuid::Uuid,
}

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)?;

        if !ctx.is_admin() {
            tracing::debug!(
                subject = %ctx.subject(),
                "admin access denied: subject is not allow-listed"
            );
            return Err(AuthError::claim_mismatch(
                "sub",
                "subject is not on the admin allow-list",
            ));
        }

        tracing::debug!(subject = %ctx.subject(), "admin access granted");

        Ok(Self {
            subject: ctx.subject().to_string(),
            email: ctx.email().map(ToString::to_string),
            identity_id: ctx.identity_id(),
        })
    }
}
