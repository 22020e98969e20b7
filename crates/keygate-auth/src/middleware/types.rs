//! Authenticated request context.

use std::sync::Arc;

use crate::storage::IdentityRecord;
use crate::token::BearerClaims;

/// Context attached to a request that passed the authentication filter.
///
/// The claim set is wrapped in `Arc` so cloning the context into extractors
/// and spawned work is cheap.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Validated token claims.
    pub claims: Arc<BearerClaims>,

    /// The resolved local identity record.
    pub identity: IdentityRecord,

    /// Whether the verified subject or email is on the admin allow-list.
    pub admin: bool,
}

impl AuthContext {
    /// The verified subject claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// The verified issuer claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    /// The verified email claim, if the provider included one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    /// The local identity record's identifier.
    #[must_use]
    pub fn identity_id(&self) -> uuid::Uuid {
        self.identity.id
    }

    /// Returns `true` if the subject holds administrative privilege.
    ///
    /// Derived solely from the static allow-list; never from headers.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Returns `true` if the token was granted a specific scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.has_scope(scope)
    }
}
