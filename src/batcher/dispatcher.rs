//! Batch dispatcher: runs batches against the processor and drains backlog.
//!
//! A dispatch begins under the state lock (timer cancelled, phase set to
//! `Dispatching`, batch taken from the head of the queue) and then runs on
//! its own task. When the batch has been settled the loop takes the next
//! batch straight away if jobs are still queued, and only returns the phase
//! to `Idle` once the queue is empty.

use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::ShutdownPolicy;
use super::gate::Phase;
use super::metrics::DispatchTrigger;
use super::microbatcher::{BatcherState, Inner};
use super::queue::{JobRecord, JobSettler};
use crate::error::JobError;

impl<I, O> BatcherState<I, O> {
    /// Enter `Dispatching` and take the next batch
    pub(crate) fn begin_dispatch(&mut self, batch_size: usize) -> Vec<JobRecord<I, O>> {
        self.cancel_timer();
        self.phase = Phase::Dispatching;
        self.queue.take_batch(batch_size)
    }

    /// Whether the drain loop should take another batch
    fn has_backlog(&self, policy: ShutdownPolicy) -> bool {
        !self.queue.is_empty() && (self.accepting || policy == ShutdownPolicy::Drain)
    }
}

impl<I: Send + 'static, O: Send + 'static> Inner<I, O> {
    /// Dispatch `batch`, then keep dispatching until the backlog is gone
    pub(crate) async fn drain(&self, mut batch: Vec<JobRecord<I, O>>, mut trigger: DispatchTrigger) {
        loop {
            self.execute_batch(batch, trigger).await;

            let next = {
                let mut state = self.lock_state();
                if state.has_backlog(self.config.shutdown_policy) {
                    let next_trigger = if state.accepting {
                        DispatchTrigger::Drain
                    } else {
                        DispatchTrigger::Shutdown
                    };
                    Some((state.begin_dispatch(self.config.batch_size), next_trigger))
                } else {
                    state.phase = Phase::Idle;
                    None
                }
            };

            match next {
                Some((next_batch, next_trigger)) => {
                    batch = next_batch;
                    trigger = next_trigger;
                }
                None => break,
            }
        }

        debug!("Dispatcher idle");
        self.idle.notify_waiters();
    }

    /// Run one batch and settle every job in it exactly once
    async fn execute_batch(&self, batch: Vec<JobRecord<I, O>>, trigger: DispatchTrigger) {
        let batch_size = batch.len();
        let started = Instant::now();
        self.metrics.record_batch(batch_size, trigger);
        debug!(batch_size, trigger = trigger.as_str(), "Dispatching batch");

        let mut inputs = Vec::with_capacity(batch_size);
        let mut settlers = Vec::with_capacity(batch_size);
        for job in batch {
            let (input, mut settler) = job.into_parts();
            settler.timer.start_processing();
            self.metrics.record_queue_wait(settler.timer.queue_wait_time());
            inputs.push(input);
            settlers.push(settler);
        }

        // Inputs have been running since submission; a failed one only fails its own job.
        let resolved = join_all(inputs).await;
        let mut values = Vec::with_capacity(batch_size);
        let mut pending = Vec::with_capacity(batch_size);
        for (result, settler) in resolved.into_iter().zip(settlers) {
            match result {
                Ok(value) => {
                    values.push(value);
                    pending.push(settler);
                }
                Err(err) => {
                    warn!(job_id = %settler.id, error = %err, "Job input failed");
                    self.fail(settler, err);
                }
            }
        }

        let mut failed = false;
        if !pending.is_empty() {
            let outcome = AssertUnwindSafe(async { self.processor.process(values).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(results)) => self.settle_results(pending, results),
                Ok(Err(err)) => {
                    failed = true;
                    warn!(batch_size = pending.len(), error = %err, "Batch processor failed");
                    let err = JobError::processor(err);
                    for settler in pending {
                        self.fail(settler, err.clone());
                    }
                }
                Err(_) => {
                    failed = true;
                    warn!(batch_size = pending.len(), "Batch processor panicked");
                    for settler in pending {
                        self.fail(settler, JobError::ProcessorPanicked);
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_batch_finished(elapsed, failed);
        debug!(
            batch_size,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch settled"
        );
    }

    /// Match results to jobs by position
    fn settle_results(&self, settlers: Vec<JobSettler<O>>, results: Vec<O>) {
        let expected = settlers.len();
        let actual = results.len();
        if actual != expected {
            warn!(expected, actual, "Batch processor returned a mismatched result count");
        }

        let mut results = results.into_iter();
        for settler in settlers {
            match results.next() {
                Some(value) => {
                    self.metrics.record_completed();
                    settler.settle(Ok(value));
                }
                None => self.fail(settler, JobError::ResultCountMismatch { expected, actual }),
            }
        }
    }

    fn fail(&self, settler: JobSettler<O>, err: JobError) {
        self.metrics.record_failed();
        settler.settle(Err(err));
    }
}
