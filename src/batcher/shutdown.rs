//! Shutdown controller.
//!
//! Shutdown stops new submissions at once, waits for the in-flight batch
//! (if any) to be fully settled, then cancels the pending timer and
//! finalizes whatever is still queued according to the `ShutdownPolicy`.
//! Waiting uses the dispatcher's idle notification, never polling.

use std::pin::pin;

use tracing::info;

use super::config::ShutdownPolicy;
use super::gate::Phase;
use super::metrics::{BatcherMetrics, DispatchTrigger};
use super::microbatcher::{BatcherState, Inner, MicroBatcher};
use crate::error::JobError;

impl<I, O> BatcherState<I, O> {
    /// Cancel the timer and settle or drop every queued job
    ///
    /// Returns the number of jobs finalized.
    pub(crate) fn finalize_queue(&mut self, policy: ShutdownPolicy, metrics: &BatcherMetrics) -> usize {
        self.cancel_timer();
        let jobs = self.queue.drain_all();
        let count = jobs.len();
        if count == 0 {
            return 0;
        }

        match policy {
            ShutdownPolicy::Discard => {
                metrics.record_discarded(count);
                drop(jobs);
            }
            // Drain normally arrives here with an empty queue
            ShutdownPolicy::Reject | ShutdownPolicy::Drain => {
                metrics.record_shutdown_rejected(count);
                for job in jobs {
                    job.reject(JobError::Shutdown);
                }
            }
        }
        count
    }
}

impl<I, O> Inner<I, O> {
    /// Wait until no batch is in flight
    pub(crate) async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            // Register before checking so a transition in between is not missed
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> MicroBatcher<I, O> {
    /// Stop accepting jobs and wait for the batcher to quiesce
    ///
    /// Returns immediately when no batch is in flight. Otherwise waits until
    /// the in-flight batch has settled every one of its jobs. Jobs still
    /// queued are then dropped, rejected or flushed depending on the
    /// configured `ShutdownPolicy`. Calling it again, or from several clones
    /// at once, waits for the same quiescence.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let policy = inner.config.shutdown_policy;

        let flush = {
            let mut state = inner.lock_state();
            if state.accepting {
                state.accepting = false;
                info!(
                    ?policy,
                    queued = state.queue.len(),
                    in_flight = state.phase == Phase::Dispatching,
                    "Shutdown requested"
                );
            }

            if policy == ShutdownPolicy::Drain
                && state.phase == Phase::Idle
                && !state.queue.is_empty()
            {
                Some(state.begin_dispatch(inner.config.batch_size))
            } else {
                None
            }
        };

        if let Some(batch) = flush {
            inner.spawn_dispatch(batch, DispatchTrigger::Shutdown);
        }

        inner.wait_idle().await;

        let (finalized, first_completion) = {
            let mut state = inner.lock_state();
            let finalized = state.finalize_queue(policy, &inner.metrics);
            let first_completion = !state.shut_down;
            state.shut_down = true;
            (finalized, first_completion)
        };

        if first_completion {
            info!(?policy, finalized, "Shutdown complete");
        }
    }
}
