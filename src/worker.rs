//! # Worker Interface
//!
//! Workers perform the actual enrichment computation for one
//! (entity, feature) pair. They may be slow (seconds) and may fail
//! transiently (network, rate limits) or permanently (invalid input); the
//! classification drives the scheduler's retry decision. The engine resolves
//! workers through a [`WorkerRegistry`] keyed by capability name, selected
//! at construction time rather than by runtime type inspection.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::EnrichError;
use crate::types::FeatureDefinition;

/// Worker failure classification.
///
/// `Transient` failures are subject to the engine's backoff/retry policy;
/// `Permanent` failures fail the job immediately with no retry.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("transient worker failure: {0}")]
    Transient(String),

    #[error("permanent worker failure: {0}")]
    Permanent(String),
}

impl From<WorkerError> for EnrichError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Transient(message) => EnrichError::WorkerTransient { message },
            WorkerError::Permanent(message) => EnrichError::WorkerPermanent { message },
        }
    }
}

/// A capability that computes one enrichment for one entity.
///
/// Implementations typically wrap an LLM call: render the definition's
/// prompt template against the raw input, invoke `model_id`, and return the
/// structured payload. The core treats the computation as opaque.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Compute the feature payload for `entity`.
    ///
    /// `raw_input` is whatever the requester supplied (JSON null when none
    /// was given); it has already passed the definition's input schema.
    async fn compute(
        &self,
        entity: &str,
        definition: &FeatureDefinition,
        raw_input: &JsonValue,
    ) -> std::result::Result<JsonValue, WorkerError>;
}

/// Capability-name to worker mapping, fixed at engine construction.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: DashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under a capability name, replacing any previous one.
    pub fn register(&self, capability: impl Into<String>, worker: Arc<dyn Worker>) {
        let capability = capability.into();
        info!(capability = %capability, "worker registered");
        self.workers.insert(capability, worker);
    }

    pub fn resolve(&self, capability: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(capability).map(|w| Arc::clone(w.value()))
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.workers.contains_key(capability)
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.workers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
