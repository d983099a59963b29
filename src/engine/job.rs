//! Computation job handles.
//!
//! One [`JobHandle`] exists per in-flight [`FeatureKey`] - the
//! at-most-one-concurrent-computation guarantee lives in the engine's job
//! map, and the handle carries everything shared between the dispatching
//! scheduler and the callers waiting on the result. Terminal outcomes are
//! broadcast through a watch channel: every waiter observes the identical
//! value or failure, in no particular order, exactly once.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::types::{FeatureKey, JobOutcome, JobState};

/// Registry of live computation jobs, keyed by feature key.
pub(crate) type JobMap = DashMap<FeatureKey, Arc<JobHandle>>;

/// Broadcast signal observed by job waiters.
#[derive(Debug, Clone)]
pub(crate) enum JobSignal {
    /// No terminal state yet.
    Pending,
    /// The job reached `Succeeded` or `Failed` with this outcome.
    Done(JobOutcome),
    /// The job was cancelled before dispatch; racing waiters re-request.
    Cancelled,
}

/// Shared state of one in-flight computation.
pub struct JobHandle {
    pub key: FeatureKey,
    pub job_id: Uuid,
    pub created_at: DateTime<Utc>,
    state: AtomicU8,
    attempts: AtomicU32,
    raw_input: JsonValue,
    signal_tx: watch::Sender<JobSignal>,
}

impl JobHandle {
    pub(crate) fn new(key: FeatureKey, raw_input: JsonValue) -> Arc<Self> {
        let (signal_tx, _rx) = watch::channel(JobSignal::Pending);
        Arc::new(Self {
            key,
            job_id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: AtomicU8::new(JobState::Pending as u8),
            attempts: AtomicU32::new(0),
            raw_input,
            signal_tx,
        })
    }

    pub fn state(&self) -> JobState {
        JobState::from(self.state.load(Ordering::Acquire))
    }

    /// Completed computation attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn raw_input(&self) -> &JsonValue {
        &self.raw_input
    }

    /// Number of callers currently waiting on this job.
    pub(crate) fn waiter_count(&self) -> usize {
        self.signal_tx.receiver_count()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<JobSignal> {
        self.signal_tx.subscribe()
    }

    pub(crate) fn transition(&self, to: JobState) {
        let from = JobState::from(self.state.swap(to as u8, Ordering::AcqRel));
        debug!(
            job_id = %self.job_id,
            key = %self.key,
            %from,
            %to,
            "job state transition"
        );
    }

    /// Record the start of a new attempt, returning its 1-based number.
    pub(crate) fn begin_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Move to the matching terminal state and broadcast the outcome.
    pub(crate) fn complete(&self, outcome: JobOutcome) {
        let terminal = if outcome.is_ok() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.transition(terminal);
        self.signal_tx.send_replace(JobSignal::Done(outcome));
    }

    /// Terminal cancellation, only valid pre-admission with no waiters left.
    pub(crate) fn cancel(&self) {
        self.transition(JobState::Cancelled);
        self.signal_tx.send_replace(JobSignal::Cancelled);
    }
}

/// Await a job's terminal signal.
///
/// Returns `None` when the job was cancelled out from under the waiter (a
/// narrow race between attaching and pre-dispatch cancellation); the caller
/// re-runs its attach-or-create step. Holding the handle keeps the sender
/// alive for as long as anyone waits.
pub(crate) async fn await_outcome(
    handle: Arc<JobHandle>,
    mut rx: watch::Receiver<JobSignal>,
) -> Option<JobOutcome> {
    let result = rx
        .wait_for(|signal| !matches!(signal, JobSignal::Pending))
        .await;
    drop(handle);

    match result {
        Ok(signal) => match &*signal {
            JobSignal::Done(outcome) => Some(outcome.clone()),
            _ => None,
        },
        // Sender dropped without a terminal signal; treat as cancelled.
        Err(_) => None,
    }
}
