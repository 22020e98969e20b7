//! The token authentication filter.
//!
//! Applied as an Axum middleware, the filter either rejects a request with
//! an [`AuthError`] (rendered by the `IntoResponse` impl in
//! [`super::error`]) or attaches an [`AuthContext`] to request extensions
//! and lets the request through. Exempt paths and a disabled filter pass
//! requests through untouched.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use keygate_auth::middleware::{Authenticated, token_auth_middleware};
//!
//! async fn whoami(Authenticated(ctx): Authenticated) -> String {
//!     ctx.subject().to_string()
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .layer(middleware::from_fn_with_state(state, token_auth_middleware));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::config::AuthFilterConfig;
use crate::error::AuthError;
use crate::keyset::KeySetCache;
use crate::storage::{IdentityProfile, IdentityStorage};
use crate::token::{BearerClaims, TokenVerifier};

use super::types::AuthContext;

// =============================================================================
// Auth State
// =============================================================================

/// State required by the authentication filter.
///
/// Cloneable; include it in your application state or pass it to
/// `axum::middleware::from_fn_with_state` directly.
#[derive(Clone)]
pub struct AuthState {
    /// Filter configuration.
    pub config: Arc<AuthFilterConfig>,

    /// Token verifier (owns the key-set cache).
    ///
    /// `None` only when the filter is disabled.
    pub verifier: Option<Arc<TokenVerifier>>,

    /// Identity record storage.
    pub identities: Arc<dyn IdentityStorage>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("verifier", &self.verifier.is_some())
            .field("identities", &"<dyn IdentityStorage>")
            .finish()
    }
}

impl AuthState {
    /// Creates the filter state from a configuration.
    ///
    /// Validates the configuration and wires up the key-set cache and
    /// verifier. A disabled filter skips that wiring entirely.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the configuration is invalid
    /// or the JWKS endpoint is unusable.
    pub fn from_config(
        config: AuthFilterConfig,
        identities: Arc<dyn IdentityStorage>,
    ) -> Result<Self, AuthError> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        if !config.enabled {
            tracing::warn!("token authentication filter is disabled");
            return Ok(Self {
                config: Arc::new(config),
                verifier: None,
                identities,
            });
        }

        let endpoint = config
            .jwks_endpoint()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let keys = KeySetCache::new(endpoint, config.keyset_config())
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let verifier = TokenVerifier::new(
            Arc::new(keys),
            config.issuer.clone(),
            config.audience.clone(),
            config.clock_skew_leeway,
        );

        Ok(Self {
            config: Arc::new(config),
            verifier: Some(Arc::new(verifier)),
            identities,
        })
    }

    /// Creates the filter state from pre-built parts.
    #[must_use]
    pub fn new(
        config: Arc<AuthFilterConfig>,
        verifier: Arc<TokenVerifier>,
        identities: Arc<dyn IdentityStorage>,
    ) -> Self {
        Self {
            config,
            verifier: Some(verifier),
            identities,
        }
    }
}

// =============================================================================
// Filter Middleware
// =============================================================================

/// Authentication middleware.
///
/// 1. Passes the request through untouched if the filter is disabled or the
///    path is exempt
/// 2. Extracts the bearer token (missing ⇒ 401)
/// 3. Verifies signature, issuer, audience and expiry against the issuer's
///    published keys
/// 4. Cross-checks the optional identity-hint header against the token's
///    email claim (mismatch ⇒ 403; the hint is never trusted alone)
/// 5. Resolves the local identity record (atomic insert-or-fetch)
/// 6. Derives the admin flag from the static allow-list
/// 7. Stores the [`AuthContext`] in request extensions
///
/// Every outcome is logged; rejection records carry the decoded claims but
/// never the raw token.
pub async fn token_auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.enabled {
        tracing::trace!("authentication disabled; passing request through");
        return Ok(next.run(req).await);
    }

    let path = req.uri().path().to_string();

    if state.config.exempt.is_exempt(&path) {
        tracing::debug!(path = %path, "authentication bypassed for exempt path");
        return Ok(next.run(req).await);
    }

    let Some(verifier) = state.verifier.as_ref() else {
        // Enabled filter without a verifier means the state was assembled
        // by hand and incorrectly; fail closed.
        return Err(AuthError::configuration(
            "filter is enabled but no verifier is configured",
        ));
    };

    let Some(token) = bearer_token(req.headers()) else {
        tracing::info!(
            path = %path,
            kind = AuthError::MissingCredentials.kind(),
            "request rejected: no bearer credentials"
        );
        return Err(AuthError::MissingCredentials);
    };
    let token = token.to_string();

    let claims = match verifier.verify(&token).await {
        Ok(claims) => claims,
        Err(err) => {
            log_rejection(&err, &token, &path);
            return Err(err);
        }
    };

    if let Err(err) = cross_check_identity_hint(&state.config, req.headers(), &claims) {
        tracing::warn!(
            path = %path,
            kind = err.kind(),
            subject = %claims.sub,
            issuer = %claims.iss,
            "request rejected: identity hint disagrees with token claims"
        );
        return Err(err);
    }

    let profile = IdentityProfile::from_claims(&claims);
    let identity = state
        .identities
        .resolve(&claims.iss, &claims.sub, &profile)
        .await
        .map_err(|err| {
            tracing::error!(
                path = %path,
                kind = err.kind(),
                subject = %claims.sub,
                issuer = %claims.iss,
                error = %err,
                "identity resolution failed"
            );
            err
        })?;

    let admin = state
        .config
        .admin
        .matches(&claims.sub, claims.email.as_deref());

    tracing::debug!(
        path = %path,
        subject = %claims.sub,
        issuer = %claims.iss,
        identity_id = %identity.id,
        admin,
        "request authenticated"
    );

    req.extensions_mut().insert(AuthContext {
        claims: Arc::new(claims),
        identity,
        admin,
    });

    Ok(next.run(req).await)
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
}

/// Compares the optional identity-hint header against the token's email
/// claim.
///
/// The hint can only ever *narrow* access: a mismatch rejects the request,
/// while a hint without a corresponding token claim is ignored entirely.
fn cross_check_identity_hint(
    config: &AuthFilterConfig,
    headers: &HeaderMap,
    claims: &BearerClaims,
) -> Result<(), AuthError> {
    let Some(header_name) = config.identity_hint_header.as_deref() else {
        return Ok(());
    };
    let Some(hint) = headers.get(header_name).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };

    match claims.email.as_deref() {
        Some(email) if email.eq_ignore_ascii_case(hint.trim()) => Ok(()),
        Some(_) => Err(AuthError::claim_mismatch(
            "email",
            format!("'{header_name}' header disagrees with the token's email claim"),
        )),
        None => {
            tracing::debug!(
                header = header_name,
                "identity hint ignored: token carries no email claim"
            );
            Ok(())
        }
    }
}

/// Emits the audit record for a rejected token.
///
/// Claims come from an unverified peek at the payload so the record names
/// the subject and issuer the token *claimed*; the raw token is never
/// logged.
fn log_rejection(err: &AuthError, token: &str, path: &str) {
    let peeked = BearerClaims::peek(token);
    tracing::warn!(
        path,
        kind = err.kind(),
        reason = err.token_reason().map(|r| r.as_str()),
        claimed_subject = peeked.as_ref().map(|c| c.sub.as_str()),
        claimed_issuer = peeked.as_ref().map(|c| c.iss.as_str()),
        claimed_expiry = peeked.as_ref().map(|c| c.exp),
        "request rejected: token verification failed"
    );
}

// =============================================================================
// Authenticated Extractor
// =============================================================================

/// Extractor handing the resolved [`AuthContext`] to handlers behind the
/// filter.
///
/// Rejects with 401 when no context is present — i.e. when the handler is
/// reachable without the filter (a wiring mistake) or the route is exempt.
pub struct Authenticated(pub AuthContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Authenticated)
            .ok_or(AuthError::MissingCredentials)
    }
}

// =============================================================================
// Tests
// =============================================================================
