//! Deduplication and versioning behavior of the engine: concurrent callers
//! for one key share a single computation, repeated reads hit the cache,
//! and a version bump forces recomputation.

mod common;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::time::timeout;

use common::{build_engine, plain_config, CountingWorker, GatedWorker};
use enrich_core::error::EnrichError;
use enrich_core::types::{FeatureDefinition, JobState};
use enrich_core::worker::{Worker, WorkerError};

#[tokio::test]
async fn concurrent_callers_share_one_computation() {
    let worker = GatedWorker::new();
    let harness = build_engine("summarize", worker.clone(), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    let mut callers = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&harness.engine);
        callers.push(tokio::spawn(async move {
            engine.get_or_compute("doc1", "summary").await
        }));
    }

    // Hold the gate until every caller has either spawned the job or
    // attached to it, then release; they all get the same value.
    worker.wait_started().await;
    loop {
        let stats = harness.engine.stats();
        if stats.jobs_spawned == 1 && stats.waiters_attached == 15 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    worker.release_one();

    for caller in callers {
        let value = caller.await.unwrap().unwrap();
        assert_eq!(value.payload, json!("OK:doc1"));
        assert_eq!(value.feature_version, 1);
    }
    assert_eq!(worker.calls(), 1);

    let stats = harness.engine.stats();
    assert_eq!(stats.jobs_spawned, 1);
    assert_eq!(stats.waiters_attached, 15);
}

#[tokio::test]
async fn repeated_reads_serve_from_cache() {
    let worker = CountingWorker::new();
    let harness = build_engine("summarize", worker.clone(), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    let first = harness.engine.get_or_compute("doc1", "summary").await.unwrap();
    let second = harness.engine.get_or_compute("doc1", "summary").await.unwrap();
    let third = harness.engine.get_or_compute("doc1", "summary").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(worker.calls(), 1);

    let stats = harness.engine.stats();
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn distinct_entities_compute_independently() {
    let worker = CountingWorker::new();
    let harness = build_engine("summarize", worker.clone(), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    let a = harness.engine.get_or_compute("doc1", "summary").await.unwrap();
    let b = harness.engine.get_or_compute("doc2", "summary").await.unwrap();

    assert_eq!(a.payload, json!("OK:doc1"));
    assert_eq!(b.payload, json!("OK:doc2"));
    assert_eq!(worker.calls(), 2);
}

#[tokio::test]
async fn version_bump_invalidates_cached_value() {
    let worker = CountingWorker::new();
    let harness = build_engine("summarize", worker.clone(), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    harness.engine.get_or_compute("doc1", "summary").await.unwrap();
    assert_eq!(worker.calls(), 1);

    // v2 looks up a different key, so the v1 value no longer satisfies reads.
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 2, "summarize"))
        .unwrap();
    let value = harness.engine.get_or_compute("doc1", "summary").await.unwrap();
    assert_eq!(value.feature_version, 2);
    assert_eq!(worker.calls(), 2);
}

#[tokio::test]
async fn version_must_advance() {
    let worker = CountingWorker::new();
    let harness = build_engine("summarize", worker, plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 2, "summarize"))
        .unwrap();

    let err = harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 2, "summarize"))
        .unwrap_err();
    assert!(matches!(
        err,
        EnrichError::VersionConflict {
            registered: 2,
            submitted: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_feature_and_capability_are_rejected() {
    let worker = CountingWorker::new();
    let harness = build_engine("summarize", worker, plain_config());

    let err = harness.engine.get_or_compute("doc1", "missing").await.unwrap_err();
    assert!(matches!(err, EnrichError::UnknownFeature { .. }));

    let err = harness
        .engine
        .register_feature(FeatureDefinition::new("sentiment", 1, "classify"))
        .unwrap_err();
    assert!(matches!(err, EnrichError::UnknownCapability { .. }));
}

struct PanickingWorker;

#[async_trait]
impl Worker for PanickingWorker {
    async fn compute(
        &self,
        _entity: &str,
        _definition: &FeatureDefinition,
        _raw_input: &JsonValue,
    ) -> Result<JsonValue, WorkerError> {
        panic!("summarizer crashed");
    }
}

#[tokio::test]
async fn worker_panic_fails_every_waiter_and_frees_the_key() {
    let harness = build_engine("summarize", Arc::new(PanickingWorker), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    let engine = Arc::clone(&harness.engine);
    let other = tokio::spawn(async move { engine.get_or_compute("doc1", "summary").await });

    // Neither caller may hang: the unwinding job must fail its waiters.
    let err = timeout(
        Duration::from_secs(2),
        harness.engine.get_or_compute("doc1", "summary"),
    )
    .await
    .expect("caller must be released")
    .unwrap_err();
    assert!(matches!(err, EnrichError::WorkerPermanent { .. }));

    let err = timeout(Duration::from_secs(2), other)
        .await
        .expect("concurrent waiter must be released")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, EnrichError::WorkerPermanent { .. }));

    // The key is not wedged: no dead job left behind, and a later request
    // gets a fresh job rather than attaching to a corpse.
    assert_eq!(harness.engine.job_state("doc1", "summary"), None);
    let err = harness.engine.get_or_compute("doc1", "summary").await.unwrap_err();
    assert!(matches!(err, EnrichError::WorkerPermanent { .. }));
}

#[tokio::test]
async fn job_state_is_visible_while_in_flight() {
    let worker = GatedWorker::new();
    let harness = build_engine("summarize", worker.clone(), plain_config());
    harness
        .engine
        .register_feature(FeatureDefinition::new("summary", 1, "summarize"))
        .unwrap();

    let engine = Arc::clone(&harness.engine);
    let caller = tokio::spawn(async move { engine.get_or_compute("doc1", "summary").await });

    worker.wait_started().await;
    assert_eq!(
        harness.engine.job_state("doc1", "summary"),
        Some(JobState::Running)
    );

    worker.release_one();
    caller.await.unwrap().unwrap();
    assert_eq!(harness.engine.job_state("doc1", "summary"), None);
}
