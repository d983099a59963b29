//! # Structured Error Taxonomy
//!
//! Every failure an engine caller can observe is a variant of [`EnrichError`].
//! Errors that fan out to multiple waiters on the same computation job are
//! cloned, so the whole taxonomy is `Clone`; the last underlying worker error
//! is preserved through [`EnrichError::RetriesExhausted`] for diagnostics.
//! The core never formats user-facing messages beyond `Display` - surfacing
//! them distinguishably is the API/CLI layer's job.

use thiserror::Error;

/// Failure reasons surfaced by the feature-store engine.
#[derive(Debug, Clone, Error)]
pub enum EnrichError {
    /// Requested feature name has no registered definition. No job is created.
    #[error("unknown feature: {name}")]
    UnknownFeature { name: String },

    /// Registration race on feature definitions. Versions must be strictly
    /// monotonically increasing per feature name.
    #[error("version conflict for feature '{name}': v{submitted} is not greater than registered v{registered}")]
    VersionConflict {
        name: String,
        registered: u32,
        submitted: u32,
    },

    /// A definition referenced a worker capability nothing is registered for.
    #[error("no worker registered for capability '{capability}'")]
    UnknownCapability { capability: String },

    /// Raw input failed the definition's input schema.
    #[error("input schema violation for feature '{feature}': {reason}")]
    SchemaViolation { feature: String, reason: String },

    /// Retryable worker failure (timeout, rate limit, transient network).
    #[error("transient worker failure: {message}")]
    WorkerTransient { message: String },

    /// Non-retryable worker failure (invalid input, unsupported entity).
    #[error("permanent worker failure: {message}")]
    WorkerPermanent { message: String },

    /// Transient failures persisted past the configured retry budget.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<EnrichError>,
    },

    /// Scheduler queue depth limit exceeded. No job state was created;
    /// callers should back off and retry later.
    #[error("scheduler overloaded: {queued} jobs queued at limit {limit}")]
    Overloaded { queued: usize, limit: usize },

    /// Storage backend call failed.
    #[error("storage backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// The engine is shutting down and no longer admits work.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EnrichError {
    /// Stable machine-readable kind, for API layers that map errors to
    /// response codes without string matching on `Display` output.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::UnknownFeature { .. } => "unknown_feature",
            EnrichError::VersionConflict { .. } => "version_conflict",
            EnrichError::UnknownCapability { .. } => "unknown_capability",
            EnrichError::SchemaViolation { .. } => "schema_violation",
            EnrichError::WorkerTransient { .. } => "worker_transient",
            EnrichError::WorkerPermanent { .. } => "worker_permanent",
            EnrichError::RetriesExhausted { .. } => "retries_exhausted",
            EnrichError::Overloaded { .. } => "overloaded",
            EnrichError::BackendUnavailable { .. } => "backend_unavailable",
            EnrichError::ShuttingDown => "shutting_down",
            EnrichError::Configuration(_) => "configuration",
        }
    }

    /// Whether a caller could reasonably retry the whole request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichError::WorkerTransient { .. }
                | EnrichError::Overloaded { .. }
                | EnrichError::BackendUnavailable { .. }
                | EnrichError::ShuttingDown
        )
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
