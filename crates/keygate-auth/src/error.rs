//! Authentication error taxonomy.
//!
//! Every failure path of the filter terminates the current request with one
//! of these errors; nothing is downgraded to "allow". Credential failures
//! map to 4xx responses, infrastructure failures to 5xx (see
//! [`crate::middleware`] for the response mapping).

use std::fmt;

use crate::keyset::KeySetError;

/// Errors produced by the token authentication filter.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request carries no usable `Authorization: Bearer` credentials.
    #[error("Missing credentials: no bearer token presented")]
    MissingCredentials,

    /// The issuer's key set could not be retrieved and no usable cached
    /// key was available. The request fails closed.
    #[error("Key retrieval failed: {message}")]
    KeyRetrieval {
        /// Description of the retrieval failure.
        message: String,
    },

    /// The bearer token failed verification.
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Why the token was rejected.
        reason: InvalidTokenReason,
    },

    /// A request-supplied identity hint disagrees with the token's claims.
    #[error("Claim mismatch on '{claim}': {message}")]
    ClaimMismatch {
        /// The claim the mismatch was detected on.
        claim: &'static str,
        /// Description of the mismatch.
        message: String,
    },

    /// The local identity record could not be resolved or created.
    #[error("Identity resolution failed: {message}")]
    UserResolution {
        /// Description of the storage failure.
        message: String,
    },

    /// The filter configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

/// Sub-reasons for [`AuthError::InvalidToken`], recorded in logs and in the
/// machine-readable error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidTokenReason {
    /// The `exp` claim has elapsed.
    Expired,
    /// The signature does not verify against the resolved key.
    BadSignature,
    /// The `iss` claim does not match the configured issuer.
    BadIssuer,
    /// The `aud` claim does not contain the configured audience.
    BadAudience,
    /// The token's `kid` was not found in the key set, even after one
    /// refresh attempt.
    UnknownKey {
        /// The key id named by the token header.
        kid: String,
    },
    /// The token header carries no `kid` at all.
    MissingKeyId,
    /// The token could not be parsed as a JWT.
    Malformed {
        /// Description of the parse failure.
        message: String,
    },
}

impl InvalidTokenReason {
    /// Stable identifier for logging and error bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::BadSignature => "bad-signature",
            Self::BadIssuer => "bad-issuer",
            Self::BadAudience => "bad-audience",
            Self::UnknownKey { .. } => "unknown-key",
            Self::MissingKeyId => "missing-key-id",
            Self::Malformed { .. } => "malformed",
        }
    }
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey { kid } => write!(f, "unknown-key (kid '{kid}')"),
            Self::Malformed { message } => write!(f, "malformed ({message})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl AuthError {
    /// Creates a new `KeyRetrieval` error.
    #[must_use]
    pub fn key_retrieval(message: impl Into<String>) -> Self {
        Self::KeyRetrieval {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(reason: InvalidTokenReason) -> Self {
        Self::InvalidToken { reason }
    }

    /// Creates a new `InvalidToken` error with the `malformed` reason.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: InvalidTokenReason::Malformed {
                message: message.into(),
            },
        }
    }

    /// Creates a new `ClaimMismatch` error.
    #[must_use]
    pub fn claim_mismatch(claim: &'static str, message: impl Into<String>) -> Self {
        Self::ClaimMismatch {
            claim,
            message: message.into(),
        }
    }

    /// Creates a new `UserResolution` error.
    #[must_use]
    pub fn user_resolution(message: impl Into<String>) -> Self {
        Self::UserResolution {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a credential failure (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::InvalidToken { .. } | Self::ClaimMismatch { .. }
        )
    }

    /// Returns `true` if this is an infrastructure failure (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::KeyRetrieval { .. } | Self::UserResolution { .. } | Self::Configuration { .. }
        )
    }

    /// Returns `true` if this is a token verification failure.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken { .. })
    }

    /// Stable machine-readable kind for logging and error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::KeyRetrieval { .. } => "key_retrieval_error",
            Self::InvalidToken { .. } => "invalid_token",
            Self::ClaimMismatch { .. } => "claim_mismatch",
            Self::UserResolution { .. } => "user_resolution_error",
            Self::Configuration { .. } => "configuration_error",
        }
    }

    /// The invalid-token sub-reason, if this is an `InvalidToken` error.
    #[must_use]
    pub fn token_reason(&self) -> Option<&InvalidTokenReason> {
        match self {
            Self::InvalidToken { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<KeySetError> for AuthError {
    fn from(e: KeySetError) -> Self {
        match e {
            KeySetError::KeyNotFound(kid) => Self::InvalidToken {
                reason: InvalidTokenReason::UnknownKey { kid },
            },
            other => Self::key_retrieval(other.to_string()),
        }
    }
}
