//! # Feature Store Engine
//!
//! The front door of the crate. `FeatureStoreEngine` ties the feature
//! registry, worker registry, storage backend, and dispatch scheduler
//! together behind one operation: `get_or_compute`. A call either returns a
//! fresh cached value, attaches to an in-flight computation for the same
//! `(entity, feature, version)` key, or spawns a new computation job and
//! waits for its outcome.
//!
//! ## Concurrency model
//!
//! The in-flight job registry is a `DashMap` keyed by `FeatureKey`; the
//! entry API makes attach-or-spawn atomic, so concurrent callers for the
//! same key can never race two jobs into existence. Outcomes are broadcast
//! over a `watch` channel so every attached waiter receives the same
//! success or failure.

pub mod job;
pub mod scheduler;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::engine::job::{await_outcome, JobHandle, JobMap};
use crate::engine::scheduler::{DispatchScheduler, JobRun, SchedulerStats};
use crate::error::{EnrichError, Result};
use crate::registry::FeatureRegistry;
use crate::storage::StorageBackend;
use crate::types::{FeatureDefinition, FeatureKey, FeatureValue, JobState};
use crate::worker::WorkerRegistry;

/// Engine-level counters, snapshot via [`FeatureStoreEngine::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub jobs_spawned: u64,
    pub waiters_attached: u64,
    pub backend_read_failures: u64,
    pub invalidations: u64,
    pub scheduler: SchedulerStats,
}

#[derive(Default)]
struct EngineCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    jobs_spawned: AtomicU64,
    waiters_attached: AtomicU64,
    backend_read_failures: AtomicU64,
    invalidations: AtomicU64,
}

/// Computes, caches, and serves enriched feature values.
pub struct FeatureStoreEngine {
    registry: FeatureRegistry,
    workers: Arc<WorkerRegistry>,
    backend: Arc<dyn StorageBackend>,
    scheduler: Arc<DispatchScheduler>,
    jobs: Arc<JobMap>,
    default_ttl: Option<std::time::Duration>,
    counters: EngineCounters,
}

impl FeatureStoreEngine {
    /// Build an engine from a validated configuration, a storage backend,
    /// and a worker registry with at least the capabilities the features
    /// you plan to register will need.
    pub fn new(
        config: StoreConfig,
        backend: Arc<dyn StorageBackend>,
        workers: Arc<WorkerRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let scheduler = DispatchScheduler::new(
            config.scheduler.max_in_flight,
            config.scheduler.queue_depth,
            config.retry_policy(),
        );
        info!(
            max_in_flight = config.scheduler.max_in_flight,
            queue_depth = ?config.scheduler.queue_depth,
            max_retries = config.retry.max_retries,
            "feature store engine initialized"
        );

        Ok(Self {
            registry: FeatureRegistry::new(),
            workers,
            backend,
            scheduler,
            jobs: Arc::new(JobMap::new()),
            default_ttl: config.default_ttl(),
            counters: EngineCounters::default(),
        })
    }

    /// Convenience constructor: load configuration from an optional file
    /// plus `ENRICH__`-prefixed environment variables.
    pub fn from_config_path(
        path: Option<&Path>,
        backend: Arc<dyn StorageBackend>,
        workers: Arc<WorkerRegistry>,
    ) -> Result<Self> {
        let config = StoreConfig::load(path)?;
        Self::new(config, backend, workers)
    }

    /// Register a feature definition.
    ///
    /// The definition's capability must already have a worker; a version
    /// that does not advance past the registered one is rejected with
    /// `VersionConflict`.
    pub fn register_feature(&self, definition: FeatureDefinition) -> Result<()> {
        if !self.workers.contains(&definition.capability) {
            return Err(EnrichError::UnknownCapability {
                capability: definition.capability.clone(),
            });
        }
        self.registry.register(definition)
    }

    /// Look up the currently registered definition for a feature.
    pub fn feature_definition(&self, feature: &str) -> Result<FeatureDefinition> {
        self.registry.resolve(feature)
    }

    /// Fetch a feature value for an entity, computing it on a miss.
    ///
    /// Equivalent to [`Self::get_or_compute_with_input`] with a null raw
    /// input, for workers that derive everything from the entity id and
    /// the definition.
    pub async fn get_or_compute(&self, entity: &str, feature: &str) -> Result<FeatureValue> {
        self.get_or_compute_with_input(entity, feature, JsonValue::Null)
            .await
    }

    /// Fetch a feature value for an entity, computing from `raw_input` on a
    /// miss.
    ///
    /// Concurrent callers for the same `(entity, feature)` at the same
    /// registered version share one computation and all observe the same
    /// outcome. The raw input that reaches the worker is the one supplied
    /// by whichever caller created the job; callers that attach to an
    /// existing job have their input ignored.
    pub async fn get_or_compute_with_input(
        &self,
        entity: &str,
        feature: &str,
        raw_input: JsonValue,
    ) -> Result<FeatureValue> {
        let definition = self.registry.resolve(feature)?;

        if let Some(schema) = &definition.input_schema {
            if let Err(reason) = schema.validate(&raw_input) {
                return Err(EnrichError::SchemaViolation {
                    feature: feature.to_string(),
                    reason,
                });
            }
        }

        let worker = self
            .workers
            .resolve(&definition.capability)
            .ok_or_else(|| EnrichError::UnknownCapability {
                capability: definition.capability.clone(),
            })?;
        let key = definition.key_for(entity);

        match self.backend.get(&key).await {
            Ok(Some(value))
                if value.feature_version == key.version
                    && !value.is_expired(chrono::Utc::now()) =>
            {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                return Ok(value);
            }
            Ok(_) => {}
            Err(err) => {
                // An unreachable backend degrades to a cache miss; the value
                // gets recomputed rather than the read error surfacing.
                self.counters
                    .backend_read_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "backend read failed, treating as miss");
            }
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        loop {
            let (handle, rx) = match self.jobs.entry(key.clone()) {
                Entry::Occupied(entry) => {
                    let handle = Arc::clone(entry.get());
                    let rx = handle.subscribe();
                    self.counters.waiters_attached.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, job_id = %handle.job_id, "attached to in-flight job");
                    (handle, rx)
                }
                Entry::Vacant(entry) => {
                    let handle = JobHandle::new(key.clone(), raw_input.clone());
                    let rx = handle.subscribe();
                    entry.insert(Arc::clone(&handle));

                    let run = JobRun {
                        handle: Arc::clone(&handle),
                        definition: definition.clone(),
                        worker: Arc::clone(&worker),
                        backend: Arc::clone(&self.backend),
                        jobs: Arc::clone(&self.jobs),
                        ttl: definition
                            .ttl_seconds
                            .map(std::time::Duration::from_secs)
                            .or(self.default_ttl),
                    };
                    if let Err(err) = self.scheduler.submit(run) {
                        self.jobs.remove(&key);
                        handle.cancel();
                        return Err(err);
                    }
                    self.counters.jobs_spawned.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, job_id = %handle.job_id, "spawned computation job");
                    (handle, rx)
                }
            };

            match await_outcome(handle, rx).await {
                Some(outcome) => return outcome,
                // The job was cancelled between attach and dispatch; retry
                // the entry so a fresh job gets spawned.
                None => continue,
            }
        }
    }

    /// Drop any stored value for `(entity, feature)` at its current
    /// registered version. The next read recomputes.
    pub async fn invalidate(&self, entity: &str, feature: &str) -> Result<()> {
        let definition = self.registry.resolve(feature)?;
        let key = definition.key_for(entity);
        self.backend.delete(&key).await?;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(key = %key, "stored value invalidated");
        Ok(())
    }

    /// List the stored feature keys for an entity.
    pub async fn list_features(&self, entity: &str) -> Result<Vec<FeatureKey>> {
        Ok(self.backend.list(entity).await?)
    }

    /// Current state of the in-flight job for `(entity, feature)`, if one
    /// exists at the currently registered version.
    pub fn job_state(&self, entity: &str, feature: &str) -> Option<JobState> {
        let definition = self.registry.resolve(feature).ok()?;
        let key = definition.key_for(entity);
        self.jobs.get(&key).map(|handle| handle.state())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            jobs_spawned: self.counters.jobs_spawned.load(Ordering::Relaxed),
            waiters_attached: self.counters.waiters_attached.load(Ordering::Relaxed),
            backend_read_failures: self
                .counters
                .backend_read_failures
                .load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            scheduler: self.scheduler.stats(),
        }
    }

    /// Stop admitting new work. In-flight attempts finish and deliver;
    /// queued and newly submitted jobs fail with `ShuttingDown`.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
