//! Bearer token claims and verification.
//!
//! [`TokenVerifier`] resolves the signing key named by the token's `kid`
//! header through the [`KeySetCache`], then validates the signature and the
//! `iss`, `aud` and `exp` claims. Verification failures carry a specific
//! [`InvalidTokenReason`] so that audit logs can distinguish an expired
//! token from a bad signature or a wrong audience.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Validation, decode_header};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, InvalidTokenReason};
use crate::keyset::KeySetCache;

// =============================================================================
// Claims
// =============================================================================

/// Claim set carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier for the authenticated principal.
    pub sub: String,

    /// Audience (string or array on the wire, handled by serde).
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Authorized party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<Vec<String>>,

    /// Subject's email address, if the provider includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Extra claims not modeled above, retained for audit logging.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl BearerClaims {
    /// Returns `true` if the token was granted a specific scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scp
            .as_ref()
            .is_some_and(|scopes| scopes.iter().any(|s| s == scope))
    }

    /// Decodes the payload segment of a token *without verification*.
    ///
    /// Used to include claims in audit records for rejected tokens. The
    /// returned claims are attacker-controlled and must never feed an
    /// authorization decision.
    #[must_use]
    pub fn peek(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Custom deserializer for audience which can be a string or array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Verifies bearer tokens against the issuer's published keys.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    leeway: Duration,
}

impl TokenVerifier {
    /// Creates a new verifier.
    ///
    /// `leeway` is the clock-skew tolerance applied to time-based claims.
    #[must_use]
    pub fn new(
        keys: Arc<KeySetCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway: Duration,
    ) -> Self {
        let issuer: String = issuer.into();
        Self {
            // Providers are inconsistent about trailing slashes in `iss`.
            issuer: issuer.trim_end_matches('/').to_string(),
            audience: audience.into(),
            keys,
            leeway,
        }
    }

    /// Verifies a bearer token and returns its validated claims.
    ///
    /// Checks, in order: token shape, `kid` presence, signature against the
    /// key named by `kid`, `iss`, `aud` and `exp` (with leeway).
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] with a specific reason for any
    ///   verification failure
    /// - [`AuthError::KeyRetrieval`] if the key set had to be fetched and
    ///   the fetch failed
    pub async fn verify(&self, token: &str) -> Result<BearerClaims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::malformed_token(e.to_string()))?;

        let kid = header
            .kid
            .ok_or(AuthError::InvalidToken {
                reason: InvalidTokenReason::MissingKeyId,
            })?;

        let (decoding_key, key_alg) = self.keys.decoding_key(&kid).await?;

        // Prefer the algorithm advertised by the key, fall back to the header.
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.leeway = self.leeway.as_secs();

        let data = jsonwebtoken::decode::<BearerClaims>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::invalid_token(map_jwt_error(&e)))?;

        tracing::trace!(
            subject = %data.claims.sub,
            issuer = %data.claims.iss,
            "token verified"
        );

        Ok(data.claims)
    }
}

/// Maps a JWT library error to a rejection reason.
fn map_jwt_error(e: &jsonwebtoken::errors::Error) -> InvalidTokenReason {
    use jsonwebtoken::errors::ErrorKind;

    match e.kind() {
        ErrorKind::ExpiredSignature => InvalidTokenReason::Expired,
        ErrorKind::InvalidSignature => InvalidTokenReason::BadSignature,
        ErrorKind::InvalidIssuer => InvalidTokenReason::BadIssuer,
        ErrorKind::InvalidAudience => InvalidTokenReason::BadAudience,
        _ => InvalidTokenReason::Malformed {
            message: e.to_string(),
        },
    }
}
