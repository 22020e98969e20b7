//! Identity record type and storage contract.
//!
//! The filter maps a verified `(issuer, subject)` pair to a local identity
//! record, creating the record lazily the first time a subject is seen.
//! Records are never deleted by the filter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::token::BearerClaims;

/// Default datetime value for deserialization when a field is missing.
fn default_datetime() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

// =============================================================================
// Identity Record
// =============================================================================

/// A local identity record for an externally authenticated principal.
///
/// At most one record exists per `(issuer, subject)` pair; see
/// [`IdentityStorage::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Internal identifier for the record.
    pub id: Uuid,

    /// Issuer the subject was authenticated by.
    pub issuer: String,

    /// Subject identifier from the token.
    pub subject: String,

    /// Email address captured from the token at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// When the record was created.
    #[serde(default = "default_datetime", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the record was last touched by a resolution.
    #[serde(default = "default_datetime", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl IdentityRecord {
    /// Creates a new record for a first-seen subject.
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            issuer: issuer.into(),
            subject: subject.into(),
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches profile data captured from the token.
    #[must_use]
    pub fn with_profile(mut self, profile: &IdentityProfile) -> Self {
        self.email = profile.email.clone();
        self
    }
}

/// Profile data captured from token claims when a record is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityProfile {
    /// Email claim, if present.
    pub email: Option<String>,
}

impl IdentityProfile {
    /// Extracts profile data from a verified claim set.
    #[must_use]
    pub fn from_claims(claims: &BearerClaims) -> Self {
        Self {
            email: claims.email.clone(),
        }
    }
}

// =============================================================================
// Identity Storage Trait
// =============================================================================

/// Storage operations for identity records.
///
/// # Example
///
/// ```ignore
/// use keygate_auth::storage::IdentityStorage;
///
/// async fn example(storage: &impl IdentityStorage) {
///     let identity = storage
///         .resolve("https://idp.example.com", "user-1", &profile)
///         .await?;
///     println!("resolved {}", identity.id);
/// }
/// ```
#[async_trait]
pub trait IdentityStorage: Send + Sync {
    /// Find a record by its `(issuer, subject)` pair.
    ///
    /// Returns `None` if the subject has never been seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject(
        &self,
        issuer: &str,
        subject: &str,
    ) -> AuthResult<Option<IdentityRecord>>;

    /// Resolve a record, creating it if the subject is first-seen.
    ///
    /// This is an atomic insert-or-fetch: concurrent calls for the same
    /// `(issuer, subject)` pair must converge to a single record. The
    /// profile is only applied when the record is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn resolve(
        &self,
        issuer: &str,
        subject: &str,
        profile: &IdentityProfile,
    ) -> AuthResult<IdentityRecord>;
}
