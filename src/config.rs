//! # Store Configuration
//!
//! Explicit, validated configuration for the feature-store engine. Every
//! knob the core needs from its environment lives here: scheduler admission
//! limits, the retry/backoff budget, cache TTL defaults, and backend
//! selection. Defaults are safe for development; deployments layer a YAML
//! file and `ENRICH_*` environment overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EnrichError, Result};
use crate::retry::RetryPolicy;

/// Root configuration for one engine instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Dispatch scheduler admission control.
    pub scheduler: SchedulerConfig,
    /// Backoff applied to transient worker failures.
    pub retry: RetryConfig,
    /// Cached-value lifetime defaults.
    pub cache: CacheConfig,
    /// Storage backend selection.
    pub storage: StorageConfig,
}

/// Bounded-concurrency settings for the dispatch scheduler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum computation jobs running concurrently.
    pub max_in_flight: usize,
    /// Optional cap on jobs queued awaiting admission. `None` queues without
    /// bound (backpressure delays admission, never drops); `Some(n)` fails
    /// new unique keys with `Overloaded` once `n` jobs are waiting.
    pub queue_depth: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            queue_depth: None,
        }
    }
}

/// Retry/backoff knobs, mirrored into [`RetryPolicy`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

/// Cached-value lifetime settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default TTL for computed values in seconds; `None` caches forever.
    /// Per-feature `ttl_seconds` on a definition wins over this default.
    pub default_ttl_seconds: Option<u64>,
}

/// Storage backend selection. Backends differ in durability and latency,
/// never in the consistency contract the engine relies on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// One of `memory`, `postgres`, `redis`.
    pub backend: String,
    pub postgres_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            postgres_url: None,
            redis_url: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from an optional YAML file plus `ENRICH_*`
    /// environment overrides (`ENRICH_SCHEDULER__MAX_IN_FLIGHT=4`), layered
    /// over the defaults.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ENRICH")
                .separator("__")
                .try_parsing(true),
        );

        let config: StoreConfig = builder
            .build()
            .map_err(|e| EnrichError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| EnrichError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler or retry loop cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_in_flight == 0 {
            return Err(EnrichError::Configuration(
                "scheduler.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(EnrichError::Configuration(
                "retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(EnrichError::Configuration(
                "retry.jitter_factor must be within [0.0, 1.0]".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(EnrichError::Configuration(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        match self.storage.backend.as_str() {
            "memory" | "postgres" | "redis" => Ok(()),
            other => Err(EnrichError::Configuration(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }

    /// Backoff policy derived from the retry section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            jitter_factor: self.retry.jitter_factor,
        }
    }

    /// Store-wide default TTL, if any.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.cache.default_ttl_seconds.map(Duration::from_secs)
    }
}
