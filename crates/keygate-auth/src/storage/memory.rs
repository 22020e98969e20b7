//! In-memory identity storage.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;

use super::identity::{IdentityProfile, IdentityRecord, IdentityStorage};

/// Identity storage backed by a concurrent in-process map.
///
/// `resolve` goes through the map's entry API, which locks the key's shard
/// for the duration of the insert-or-fetch, so concurrent first-seen
/// requests for the same subject converge to a single record.
///
/// Suitable for tests and single-process deployments; records do not
/// survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStorage {
    records: DashMap<(String, String), IdentityRecord>,
}

impl InMemoryIdentityStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdentityStorage for InMemoryIdentityStorage {
    async fn find_by_subject(
        &self,
        issuer: &str,
        subject: &str,
    ) -> AuthResult<Option<IdentityRecord>> {
        let key = (issuer.to_string(), subject.to_string());
        Ok(self.records.get(&key).map(|r| r.clone()))
    }

    async fn resolve(
        &self,
        issuer: &str,
        subject: &str,
        profile: &IdentityProfile,
    ) -> AuthResult<IdentityRecord> {
        let key = (issuer.to_string(), subject.to_string());
        let record = self
            .records
            .entry(key)
            .or_insert_with(|| {
                tracing::info!(issuer, subject, "identity record created");
                IdentityRecord::new(issuer, subject).with_profile(profile)
            })
            .clone();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_resolve_creates_once() {
        let store = InMemoryIdentityStorage::new();
        let profile = IdentityProfile {
            email: Some("user@example.com".to_string()),
        };

        let first = store.resolve("iss", "sub", &profile).await.unwrap();
        let second = store.resolve("iss", "sub", &profile).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.email.as_deref(), Some("user@example.com"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_subjects_get_distinct_records() {
        let store = InMemoryIdentityStorage::new();
        let profile = IdentityProfile::default();

        let a = store.resolve("iss", "alice", &profile).await.unwrap();
        let b = store.resolve("iss", "bob", &profile).await.unwrap();
        let c = store.resolve("other-iss", "alice", &profile).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_find_by_subject() {
        let store = InMemoryIdentityStorage::new();
        let profile = IdentityProfile::default();

        assert!(store.find_by_subject("iss", "sub").await.unwrap().is_none());

        let created = store.resolve("iss", "sub", &profile).await.unwrap();
        let found = store.find_by_subject("iss", "sub").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_concurrent_first_seen_converges() {
        let store = Arc::new(InMemoryIdentityStorage::new());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .resolve("iss", "race", &IdentityProfile::default())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_profile_only_applied_on_creation() {
        let store = InMemoryIdentityStorage::new();

        let first = store
            .resolve(
                "iss",
                "sub",
                &IdentityProfile {
                    email: Some("first@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        let second = store
            .resolve(
                "iss",
                "sub",
                &IdentityProfile {
                    email: Some("second@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email.as_deref(), Some("first@example.com"));
    }
}
