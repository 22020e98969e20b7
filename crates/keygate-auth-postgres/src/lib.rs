//! PostgreSQL identity storage backend for keygate-auth.
//!
//! Implements the [`keygate_auth::IdentityStorage`] contract on top of a
//! PostgreSQL table with a unique `(issuer, subject)` constraint. Resolution
//! uses an `INSERT … ON CONFLICT … DO UPDATE … RETURNING` upsert, so
//! concurrent first-seen requests for the same subject converge to a single
//! row without a check-then-act race.
//!
//! # Example
//!
//! ```ignore
//! use keygate_auth_postgres::PgIdentityStorage;
//!
//! let storage = PgIdentityStorage::connect("postgres://localhost/keygate").await?;
//! storage.ensure_schema().await?;
//!
//! let identity = storage.resolve(issuer, subject, &profile).await?;
//! ```

pub mod identity;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use identity::PgIdentityStorage;

/// Errors that can occur during identity storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
