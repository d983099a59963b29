//! # Enrich Core
//!
//! A feature store for LLM-derived attributes: register versioned feature
//! definitions, plug in workers that know how to compute them, and read
//! values through a cache-first engine that deduplicates concurrent
//! computation, bounds in-flight work, and retries transient worker
//! failures with exponential backoff.
//!
//! ## Architecture
//!
//! - **[`types`]** — feature keys, definitions, values, and job states
//! - **[`schema`]** — lightweight structural validation for worker inputs
//!   and outputs
//! - **[`registry`]** — versioned feature definition registry
//! - **[`worker`]** — the [`worker::Worker`] trait and the capability
//!   registry that routes definitions to implementations
//! - **[`storage`]** — the [`storage::StorageBackend`] trait with memory,
//!   Postgres, and Redis backends
//! - **[`engine`]** — the [`engine::FeatureStoreEngine`] front door plus
//!   the dispatch scheduler and in-flight job registry
//! - **[`retry`]** / **[`config`]** / **[`error`]** / **[`logging`]** —
//!   backoff policy, layered configuration, the error taxonomy, and
//!   tracing setup
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use enrich_core::config::StoreConfig;
//! use enrich_core::engine::FeatureStoreEngine;
//! use enrich_core::storage::MemoryBackend;
//! use enrich_core::types::FeatureDefinition;
//! use enrich_core::worker::WorkerRegistry;
//!
//! # async fn demo(summarizer: Arc<dyn enrich_core::worker::Worker>) -> enrich_core::error::Result<()> {
//! let workers = Arc::new(WorkerRegistry::new());
//! workers.register("summarize", summarizer);
//!
//! let engine = FeatureStoreEngine::new(
//!     StoreConfig::default(),
//!     Arc::new(MemoryBackend::new()),
//!     workers,
//! )?;
//! engine.register_feature(FeatureDefinition::new("summary", 1, "summarize"))?;
//!
//! let value = engine.get_or_compute("doc-42", "summary").await?;
//! println!("{}", value.payload);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod storage;
pub mod types;
pub mod worker;

pub use config::StoreConfig;
pub use engine::{EngineStats, FeatureStoreEngine};
pub use error::{EnrichError, Result};
pub use registry::FeatureRegistry;
pub use retry::RetryPolicy;
pub use schema::{FieldType, Schema};
pub use storage::{MemoryBackend, StorageBackend, StorageError};
pub use types::{FeatureDefinition, FeatureKey, FeatureValue, JobState};
pub use worker::{Worker, WorkerError, WorkerRegistry};
