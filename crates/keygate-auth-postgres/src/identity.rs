//! Identity record storage.
//!
//! Table layout (created by [`PgIdentityStorage::ensure_schema`]):
//!
//! ```sql
//! CREATE TABLE identity (
//!     id          UUID PRIMARY KEY,
//!     issuer      TEXT NOT NULL,
//!     subject     TEXT NOT NULL,
//!     email       TEXT,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL,
//!     UNIQUE (issuer, subject)
//! );
//! ```
//!
//! The unique constraint carries the invariant: at most one record per
//! `(issuer, subject)` pair.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use keygate_auth::{AuthError, AuthResult, IdentityProfile, IdentityRecord, IdentityStorage};

use crate::{PgPool, StorageResult};

/// Row tuple as selected from the `identity` table.
type IdentityRow = (
    Uuid,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
);

fn record_from_row(row: IdentityRow) -> IdentityRecord {
    IdentityRecord {
        id: row.0,
        issuer: row.1,
        subject: row.2,
        email: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS identity (
    id          UUID PRIMARY KEY,
    issuer      TEXT NOT NULL,
    subject     TEXT NOT NULL,
    email       TEXT,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    UNIQUE (issuer, subject)
)
"#;

// =============================================================================
// Identity Storage
// =============================================================================

/// PostgreSQL-backed identity storage.
#[derive(Debug, Clone)]
pub struct PgIdentityStorage {
    pool: Arc<PgPool>,
}

impl PgIdentityStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        use sqlx_postgres::Postgres;

        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `identity` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        query(SCHEMA_SQL).execute(self.pool.as_ref()).await?;
        tracing::debug!("identity schema ensured");
        Ok(())
    }
}

#[async_trait]
impl IdentityStorage for PgIdentityStorage {
    async fn find_by_subject(
        &self,
        issuer: &str,
        subject: &str,
    ) -> AuthResult<Option<IdentityRecord>> {
        let row: Option<IdentityRow> = query_as(
            r#"
            SELECT id, issuer, subject, email, created_at, updated_at
            FROM identity
            WHERE issuer = $1
              AND subject = $2
            "#,
        )
        .bind(issuer)
        .bind(subject)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| AuthError::user_resolution(e.to_string()))?;

        Ok(row.map(record_from_row))
    }

    async fn resolve(
        &self,
        issuer: &str,
        subject: &str,
        profile: &IdentityProfile,
    ) -> AuthResult<IdentityRecord> {
        let now = OffsetDateTime::now_utc();

        // Insert-or-fetch: on conflict the existing row wins and only its
        // updated_at moves. DO UPDATE (rather than DO NOTHING) is what makes
        // RETURNING yield the surviving row in both cases.
        let row: IdentityRow = query_as(
            r#"
            INSERT INTO identity (id, issuer, subject, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (issuer, subject)
            DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING id, issuer, subject, email, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(issuer)
        .bind(subject)
        .bind(profile.email.as_deref())
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| AuthError::user_resolution(e.to_string()))?;

        if row.4 == row.5 {
            tracing::info!(issuer, subject, "identity record created");
        }

        Ok(record_from_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_row() {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let record = record_from_row((
            id,
            "https://idp.example.com".to_string(),
            "user-1".to_string(),
            Some("user@example.com".to_string()),
            now,
            now,
        ));

        assert_eq!(record.id, id);
        assert_eq!(record.issuer, "https://idp.example.com");
        assert_eq!(record.subject, "user-1");
        assert_eq!(record.email.as_deref(), Some("user@example.com"));
        assert_eq!(record.created_at, now);
    }

    #[test]
    fn test_schema_enforces_single_record_per_subject() {
        assert!(SCHEMA_SQL.contains("UNIQUE (issuer, subject)"));
    }
}
