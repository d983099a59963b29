//! PostgreSQL storage backend.
//!
//! One `feature_values` table keyed by `(entity, feature, version)` with a
//! JSONB payload. Writes upsert (last-write-wins); reads are plain primary
//! key lookups. Queries are bound at runtime so the crate builds without a
//! live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{StorageBackend, StorageError};
use crate::types::{FeatureKey, FeatureValue};

const CREATE_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS feature_values (
    entity      TEXT        NOT NULL,
    feature     TEXT        NOT NULL,
    version     INTEGER     NOT NULL,
    payload     JSONB       NOT NULL,
    computed_at TIMESTAMPTZ NOT NULL,
    expires_at  TIMESTAMPTZ,
    PRIMARY KEY (entity, feature, version)
)";

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with a small dedicated pool.
    pub async fn connect(url: &str) -> std::result::Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Create the `feature_values` table if missing.
    pub async fn migrate(&self) -> std::result::Result<(), StorageError> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn version_param(key: &FeatureKey) -> std::result::Result<i32, StorageError> {
        i32::try_from(key.version).map_err(|_| {
            StorageError::Serialization(format!(
                "feature version {} exceeds backend range",
                key.version
            ))
        })
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn get(
        &self,
        key: &FeatureKey,
    ) -> std::result::Result<Option<FeatureValue>, StorageError> {
        let version = Self::version_param(key)?;
        let row = sqlx::query(
            "SELECT payload, computed_at, expires_at FROM feature_values \
             WHERE entity = $1 AND feature = $2 AND version = $3",
        )
        .bind(&key.entity)
        .bind(&key.feature)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: serde_json::Value = row
            .try_get("payload")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let computed_at: DateTime<Utc> = row
            .try_get("computed_at")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let expires_at: Option<DateTime<Utc>> = row
            .try_get("expires_at")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(FeatureValue {
            payload,
            computed_at,
            feature_version: key.version,
            expires_at,
        }))
    }

    async fn put(
        &self,
        key: &FeatureKey,
        value: &FeatureValue,
    ) -> std::result::Result<(), StorageError> {
        let version = Self::version_param(key)?;
        sqlx::query(
            "INSERT INTO feature_values (entity, feature, version, payload, computed_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (entity, feature, version) DO UPDATE SET \
                 payload = EXCLUDED.payload, \
                 computed_at = EXCLUDED.computed_at, \
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(&key.entity)
        .bind(&key.feature)
        .bind(version)
        .bind(&value.payload)
        .bind(value.computed_at)
        .bind(value.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &FeatureKey) -> std::result::Result<(), StorageError> {
        let version = Self::version_param(key)?;
        sqlx::query("DELETE FROM feature_values WHERE entity = $1 AND feature = $2 AND version = $3")
            .bind(&key.entity)
            .bind(&key.feature)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, entity: &str) -> std::result::Result<Vec<FeatureKey>, StorageError> {
        let rows = sqlx::query("SELECT feature, version FROM feature_values WHERE entity = $1")
            .bind(entity)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let feature: String = row
                    .try_get("feature")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let version: i32 = row
                    .try_get("version")
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(FeatureKey::new(entity, feature, version as u32))
            })
            .collect()
    }
}
