//! # Storage Backend Contract
//!
//! Durable key/value persistence for computed feature values. Every backend
//! honors the same contract: `get`/`put`/`delete`/`list` with overwrite
//! (last-write-wins) semantics and no cross-key transactions. The engine
//! treats all backends as eventually consistent at best and supplies its own
//! in-flight deduplication layer; backends differ only in durability and
//! latency.
//!
//! `get` distinguishes "definitely absent" (`Ok(None)`) from "unknown"
//! (`Err(StorageError::Unavailable)`); the engine maps the latter to a cache
//! miss on the read path.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::EnrichError;
use crate::types::{FeatureKey, FeatureValue};

pub mod memory;
pub mod postgres_store;
pub mod redis_store;

pub use memory::MemoryBackend;
pub use postgres_store::PostgresBackend;
pub use redis_store::{RedisBackend, RedisBackendConfig};

/// Failures a storage backend can report.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The backend could not be reached or the call failed; the true state
    /// of the key is unknown.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl From<StorageError> for EnrichError {
    fn from(err: StorageError) -> Self {
        EnrichError::BackendUnavailable {
            message: err.to_string(),
        }
    }
}

/// Contract every storage backend implements.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the value stored under `key`. `Ok(None)` means definitely
    /// absent.
    async fn get(&self, key: &FeatureKey)
        -> std::result::Result<Option<FeatureValue>, StorageError>;

    /// Store `value` under `key`, overwriting any previous value.
    async fn put(
        &self,
        key: &FeatureKey,
        value: &FeatureValue,
    ) -> std::result::Result<(), StorageError>;

    /// Delete the value under `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &FeatureKey) -> std::result::Result<(), StorageError>;

    /// List every stored key for one entity.
    async fn list(&self, entity: &str) -> std::result::Result<Vec<FeatureKey>, StorageError>;
}
