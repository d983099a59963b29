//! In-process storage backend.
//!
//! Backs development and tests; also the reference implementation of the
//! storage contract. Values live in a concurrent map keyed by the canonical
//! key string. An unavailability switch lets tests exercise the engine's
//! degraded read/write paths.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{StorageBackend, StorageError};
use crate::types::{FeatureKey, FeatureValue};

#[derive(Default)]
pub struct MemoryBackend {
    values: DashMap<String, (FeatureKey, FeatureValue)>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every subsequent call fails with
    /// `StorageError::Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check_available(&self) -> std::result::Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable(
                "memory backend marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(
        &self,
        key: &FeatureKey,
    ) -> std::result::Result<Option<FeatureValue>, StorageError> {
        self.check_available()?;
        Ok(self
            .values
            .get(&key.key_string())
            .map(|entry| entry.value().1.clone()))
    }

    async fn put(
        &self,
        key: &FeatureKey,
        value: &FeatureValue,
    ) -> std::result::Result<(), StorageError> {
        self.check_available()?;
        self.values
            .insert(key.key_string(), (key.clone(), value.clone()));
        Ok(())
    }

    async fn delete(&self, key: &FeatureKey) -> std::result::Result<(), StorageError> {
        self.check_available()?;
        self.values.remove(&key.key_string());
        Ok(())
    }

    async fn list(&self, entity: &str) -> std::result::Result<Vec<FeatureKey>, StorageError> {
        self.check_available()?;
        let prefix = FeatureKey::entity_prefix(entity);
        Ok(self
            .values
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().0.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_delete_round_trip() {
        tokio_test::block_on(async {
            let backend = MemoryBackend::new();
            let key = FeatureKey::new("doc1", "summary", 1);
            let value = FeatureValue::new(json!({"summary": "short"}), 1);

            assert_eq!(backend.get(&key).await.unwrap(), None);

            backend.put(&key, &value).await.unwrap();
            assert_eq!(backend.get(&key).await.unwrap(), Some(value.clone()));

            // Overwrite wins.
            let newer = FeatureValue::new(json!({"summary": "longer"}), 1);
            backend.put(&key, &newer).await.unwrap();
            assert_eq!(backend.get(&key).await.unwrap(), Some(newer));

            backend.delete(&key).await.unwrap();
            assert_eq!(backend.get(&key).await.unwrap(), None);
            // Deleting an absent key is fine.
            backend.delete(&key).await.unwrap();
        });
    }

    #[test]
    fn list_filters_by_entity() {
        tokio_test::block_on(async {
            let backend = MemoryBackend::new();
            let value = FeatureValue::new(json!(1), 1);
            backend
                .put(&FeatureKey::new("doc1", "summary", 1), &value)
                .await
                .unwrap();
            backend
                .put(&FeatureKey::new("doc1", "sentiment", 2), &value)
                .await
                .unwrap();
            backend
                .put(&FeatureKey::new("doc2", "summary", 1), &value)
                .await
                .unwrap();

            let mut keys = backend.list("doc1").await.unwrap();
            keys.sort_by(|a, b| a.feature.cmp(&b.feature));
            assert_eq!(keys.len(), 2);
            assert_eq!(keys[0].feature, "sentiment");
            assert_eq!(keys[1].feature, "summary");

            assert!(backend.list("doc3").await.unwrap().is_empty());
        });
    }

    #[test]
    fn unavailability_switch_fails_all_calls() {
        tokio_test::block_on(async {
            let backend = MemoryBackend::new();
            let key = FeatureKey::new("doc1", "summary", 1);
            backend.set_unavailable(true);

            assert!(matches!(
                backend.get(&key).await,
                Err(StorageError::Unavailable(_))
            ));
            assert!(backend
                .put(&key, &FeatureValue::new(json!(1), 1))
                .await
                .is_err());

            backend.set_unavailable(false);
            assert_eq!(backend.get(&key).await.unwrap(), None);
        });
    }
}
