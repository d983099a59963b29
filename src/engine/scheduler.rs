//! # Dispatch Scheduler
//!
//! Turns a cache miss into exactly one enrichment attempt sequence: bounded
//! admission through a semaphore (`max_in_flight` permits), an optional
//! queue-depth limit that rejects new submissions with `Overloaded`, a
//! sequential retry loop with exponential backoff for transient worker
//! failures, and write-through to the storage backend on success. Retries
//! release the slot while backing off, so a sleeping job never starves
//! unrelated keys, and a retried job must be re-admitted before running
//! again.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::engine::job::{JobHandle, JobMap};
use crate::error::EnrichError;
use crate::retry::RetryPolicy;
use crate::storage::StorageBackend;
use crate::types::{FeatureValue, JobOutcome, JobState};
use crate::worker::{Worker, WorkerError};

/// Fails a job whose task unwinds before reaching a terminal state.
///
/// A panicking `Worker` impl would otherwise leave the job-map entry alive
/// with the signal stuck at `Pending`: current waiters would hang forever
/// and every later caller for the key would attach to the dead job. On
/// unwind this completes the handle with an error and clears the entry.
struct AbortGuard {
    scheduler: Arc<DispatchScheduler>,
    handle: Arc<JobHandle>,
    jobs: Arc<JobMap>,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.handle.state().is_terminal() {
            return;
        }
        warn!(
            job_id = %self.handle.job_id,
            key = %self.handle.key,
            "computation task aborted mid-job, failing the job for its waiters"
        );
        self.scheduler.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.handle.complete(Err(EnrichError::WorkerPermanent {
            message: "computation aborted unexpectedly (worker panic)".to_string(),
        }));
        self.jobs.remove(&self.handle.key);
    }
}

/// Everything one computation job needs to run to completion.
pub(crate) struct JobRun {
    pub handle: Arc<JobHandle>,
    pub definition: crate::types::FeatureDefinition,
    pub worker: Arc<dyn Worker>,
    pub backend: Arc<dyn StorageBackend>,
    pub jobs: Arc<JobMap>,
    pub ttl: Option<Duration>,
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub admitted: u64,
    pub retries: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    admitted: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

pub(crate) struct DispatchScheduler {
    semaphore: Arc<Semaphore>,
    queue_depth: Option<usize>,
    queued: AtomicUsize,
    retry: RetryPolicy,
    shutting_down: AtomicBool,
    counters: Counters,
}

impl DispatchScheduler {
    pub(crate) fn new(
        max_in_flight: usize,
        queue_depth: Option<usize>,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            queue_depth,
            queued: AtomicUsize::new(0),
            retry,
            shutting_down: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Jobs submitted or backing off that are not currently admitted.
    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting work. Queued jobs fail with `ShuttingDown`; running
    /// attempts complete and deliver their results.
    pub(crate) fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.semaphore.close();
        info!("dispatch scheduler shut down; queued jobs will be released");
    }

    /// Admit a new job or reject it before any state escapes.
    ///
    /// On `Err` the caller discards the job handle; no waiter can be left
    /// behind because the submitting caller is the only one so far.
    pub(crate) fn submit(self: &Arc<Self>, run: JobRun) -> crate::error::Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EnrichError::ShuttingDown);
        }

        // Reserving the queue slot and checking the limit must be one
        // atomic step, or racing submissions could overshoot the limit.
        if let Some(limit) = self.queue_depth {
            let reserved = self
                .queued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                    (queued < limit).then_some(queued + 1)
                });
            if let Err(queued) = reserved {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %run.handle.key,
                    queued,
                    limit,
                    "job rejected: scheduler queue depth limit reached"
                );
                return Err(EnrichError::Overloaded { queued, limit });
            }
        } else {
            self.queued.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_job(run).await });
        Ok(())
    }

    async fn run_job(self: Arc<Self>, run: JobRun) {
        let key = run.handle.key.clone();
        let _abort_guard = AbortGuard {
            scheduler: Arc::clone(&self),
            handle: Arc::clone(&run.handle),
            jobs: Arc::clone(&run.jobs),
        };
        // Whether this job currently counts against the admission queue.
        let mut in_queue = true;
        let mut attempt = 0;

        let outcome: JobOutcome = loop {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    if in_queue {
                        self.queued.fetch_sub(1, Ordering::SeqCst);
                    }
                    break Err(EnrichError::ShuttingDown);
                }
            };
            if in_queue {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                in_queue = false;
            }

            if attempt == 0 && run.handle.waiter_count() == 0 {
                drop(permit);
                debug!(
                    job_id = %run.handle.job_id,
                    key = %key,
                    "all waiters detached before dispatch, cancelling job"
                );
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                run.handle.cancel();
                run.jobs.remove(&key);
                return;
            }

            run.handle.transition(JobState::Running);
            attempt = run.handle.begin_attempt();
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            debug!(
                job_id = %run.handle.job_id,
                key = %key,
                attempt,
                capability = %run.definition.capability,
                "computation attempt started"
            );

            let result = run
                .worker
                .compute(&key.entity, &run.definition, run.handle.raw_input())
                .await;
            drop(permit);

            match result {
                Ok(payload) => {
                    if let Some(schema) = &run.definition.output_schema {
                        if let Err(reason) = schema.validate(&payload) {
                            break Err(EnrichError::WorkerPermanent {
                                message: format!("output schema violation: {reason}"),
                            });
                        }
                    }

                    let mut value = FeatureValue::new(payload, key.version);
                    if let Some(ttl) = run.ttl {
                        value = value.with_ttl(ttl);
                    }

                    // A write failure must not cost the waiters their value;
                    // they get the computed result, the cache just stays cold.
                    if let Err(err) = run.backend.put(&key, &value).await {
                        warn!(
                            key = %key,
                            error = %err,
                            "write-through failed; value delivered to waiters but not persisted"
                        );
                    }
                    break Ok(value);
                }
                Err(WorkerError::Permanent(message)) => {
                    break Err(EnrichError::WorkerPermanent { message });
                }
                Err(WorkerError::Transient(message)) => {
                    if attempt > self.retry.max_retries {
                        break Err(EnrichError::RetriesExhausted {
                            attempts: attempt,
                            last_error: Box::new(EnrichError::WorkerTransient { message }),
                        });
                    }

                    let delay = self.retry.delay_for(attempt - 1);
                    run.handle.transition(JobState::Pending);
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        job_id = %run.handle.job_id,
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient failure, backing off before re-admission"
                    );
                    tokio::time::sleep(delay).await;
                    self.queued.fetch_add(1, Ordering::SeqCst);
                    in_queue = true;
                }
            }
        };

        match &outcome {
            Ok(_) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    job_id = %run.handle.job_id,
                    key = %key,
                    attempts = run.handle.attempts(),
                    "enrichment job succeeded"
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    job_id = %run.handle.job_id,
                    key = %key,
                    attempts = run.handle.attempts(),
                    error = %err,
                    "enrichment job failed"
                );
            }
        }

        // Broadcast before removing the registry entry so any waiter that
        // grabbed the handle concurrently still observes the terminal signal.
        run.handle.complete(outcome);
        run.jobs.remove(&key);
    }
}
