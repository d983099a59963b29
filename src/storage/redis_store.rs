//! Redis storage backend (remote cache).
//!
//! Values are stored as JSON blobs under the canonical key string with a
//! configurable key prefix. A value carrying an expiry is written with a
//! matching Redis TTL, so the cache drops it on its own; listing scans by
//! entity prefix. Uses a multiplexed connection manager, so clones share one
//! TCP connection.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{StorageBackend, StorageError};
use crate::types::{FeatureKey, FeatureValue};

/// Connection settings for the Redis backend.
#[derive(Debug, Clone)]
pub struct RedisBackendConfig {
    /// Redis connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Namespace prefix applied to every stored key.
    pub key_prefix: String,
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "enrich:".to_string(),
        }
    }
}

impl RedisBackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

pub struct RedisBackend {
    conn: ConnectionManager,
    config: RedisBackendConfig,
}

impl RedisBackend {
    pub async fn connect(config: RedisBackendConfig) -> std::result::Result<Self, StorageError> {
        let client = Client::open(config.url.clone())
            .map_err(|e| StorageError::Unavailable(format!("redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Unavailable(format!("redis connection: {e}")))?;
        Ok(Self { conn, config })
    }

    fn storage_key(&self, key: &FeatureKey) -> String {
        format!("{}{}", self.config.key_prefix, key.key_string())
    }

    fn encode(value: &FeatureValue) -> std::result::Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn decode(data: &[u8]) -> std::result::Result<FeatureValue, StorageError> {
        serde_json::from_slice(data).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn get(
        &self,
        key: &FeatureKey,
    ) -> std::result::Result<Option<FeatureValue>, StorageError> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn
            .get(self.storage_key(key))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        data.as_deref().map(Self::decode).transpose()
    }

    async fn put(
        &self,
        key: &FeatureKey,
        value: &FeatureValue,
    ) -> std::result::Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let storage_key = self.storage_key(key);
        let data = Self::encode(value)?;

        // Mirror the value expiry as a Redis TTL so the cache self-cleans.
        let ttl_seconds = value
            .expires_at
            .map(|expiry| (expiry - Utc::now()).num_seconds());

        match ttl_seconds {
            Some(seconds) if seconds <= 0 => {
                // Already expired; storing it would only produce misses.
                Ok(())
            }
            Some(seconds) => {
                let _: () = conn
                    .set_ex(storage_key, data, seconds as u64)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(())
            }
            None => {
                let _: () = conn
                    .set(storage_key, data)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &FeatureKey) -> std::result::Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.storage_key(key))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, entity: &str) -> std::result::Result<Vec<FeatureKey>, StorageError> {
        let mut conn = self.conn.clone();
        let pattern = format!(
            "{}{}*",
            self.config.key_prefix,
            FeatureKey::entity_prefix(entity)
        );

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;

            for raw in batch {
                if let Some(stripped) = raw.strip_prefix(&self.config.key_prefix) {
                    if let Some(key) = FeatureKey::parse(stripped) {
                        keys.push(key);
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_prefixed() {
        let config = RedisBackendConfig::default();
        assert_eq!(config.key_prefix, "enrich:");
        assert_eq!(config.url, "redis://localhost:6379");

        let custom = RedisBackendConfig::new("redis://cache:6379");
        assert_eq!(custom.url, "redis://cache:6379");
        assert_eq!(custom.key_prefix, "enrich:");
    }

    #[test]
    fn encode_decode_round_trip() {
        let value = FeatureValue::new(serde_json::json!({"summary": "s"}), 2);
        let data = RedisBackend::encode(&value).unwrap();
        let decoded = RedisBackend::decode(&data).unwrap();
        assert_eq!(decoded, value);

        assert!(RedisBackend::decode(b"not json").is_err());
    }
}
