//! Shared fixtures for the integration suites: scripted workers and an
//! engine builder backed by the in-memory storage backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Notify;

use enrich_core::config::StoreConfig;
use enrich_core::engine::FeatureStoreEngine;
use enrich_core::storage::MemoryBackend;
use enrich_core::types::FeatureDefinition;
use enrich_core::worker::{Worker, WorkerError, WorkerRegistry};

/// Succeeds immediately with `"OK:{entity}"` and counts invocations.
pub struct CountingWorker {
    calls: AtomicUsize,
}

impl CountingWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for CountingWorker {
    async fn compute(
        &self,
        entity: &str,
        _definition: &FeatureDefinition,
        _raw_input: &JsonValue,
    ) -> Result<JsonValue, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!(format!("OK:{entity}")))
    }
}

/// Fails transiently for the first `failures` invocations, then succeeds.
pub struct FlakyWorker {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyWorker {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for FlakyWorker {
    async fn compute(
        &self,
        entity: &str,
        _definition: &FeatureDefinition,
        _raw_input: &JsonValue,
    ) -> Result<JsonValue, WorkerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(WorkerError::Transient(format!(
                "upstream timeout on call {call}"
            )))
        } else {
            Ok(json!(format!("OK:{entity}")))
        }
    }
}

/// Blocks inside `compute` until released, so tests can hold a dispatch
/// slot open and observe what happens to jobs behind it.
pub struct GatedWorker {
    started: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl GatedWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Resolves once a compute call is inside the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release_one(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for GatedWorker {
    async fn compute(
        &self,
        entity: &str,
        _definition: &FeatureDefinition,
        _raw_input: &JsonValue,
    ) -> Result<JsonValue, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(json!(format!("OK:{entity}")))
    }
}

/// An engine over `MemoryBackend` with a single capability registered.
pub struct TestHarness {
    pub engine: Arc<FeatureStoreEngine>,
    pub backend: Arc<MemoryBackend>,
    pub workers: Arc<WorkerRegistry>,
}

pub fn build_engine(capability: &str, worker: Arc<dyn Worker>, config: StoreConfig) -> TestHarness {
    let backend = Arc::new(MemoryBackend::new());
    let workers = Arc::new(WorkerRegistry::new());
    workers.register(capability, worker);

    let engine = FeatureStoreEngine::new(config, backend.clone(), workers.clone())
        .expect("engine configuration is valid");
    TestHarness {
        engine: Arc::new(engine),
        backend,
        workers,
    }
}

/// Config with retries disabled.
pub fn plain_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.retry.max_retries = 0;
    config
}

/// Config with fast deterministic backoff for retry tests.
pub fn fast_retry_config(max_retries: u32) -> StoreConfig {
    let mut config = StoreConfig::default();
    config.retry.max_retries = max_retries;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.retry.jitter_factor = 0.0;
    config
}
