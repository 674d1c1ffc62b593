//! The public batcher handle and the state it shares with its tasks.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use super::config::BatcherConfig;
use super::gate::{self, GateDecision, Phase};
use super::metrics::{BatcherMetrics, DispatchTrigger, MetricsSnapshot};
use super::processor::BatchProcessor;
use super::queue::{JobHandle, JobId, JobQueue, JobRecord};
use crate::error::{BoxError, ConfigError, JobError};

/// The single pending frequency timer
pub(crate) struct ArmedTimer {
    pub generation: u64,
    pub handle: JoinHandle<()>,
}

/// Mutable state of one batcher, guarded by a single lock
pub(crate) struct BatcherState<I, O> {
    pub queue: JobQueue<I, O>,
    pub phase: Phase,
    pub timer: Option<ArmedTimer>,
    pub next_timer_generation: u64,
    /// Cleared when shutdown is requested
    pub accepting: bool,
    /// Set once shutdown has finalized the queue
    pub shut_down: bool,
}

impl<I, O> BatcherState<I, O> {
    fn new() -> Self {
        Self {
            queue: JobQueue::new(),
            phase: Phase::Idle,
            timer: None,
            next_timer_generation: 0,
            accepting: true,
            shut_down: false,
        }
    }

    /// Abort the pending timer, if any
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

pub(crate) struct Inner<I, O> {
    pub config: BatcherConfig,
    pub processor: Box<dyn BatchProcessor<I, O>>,
    pub state: Mutex<BatcherState<I, O>>,
    /// Notified whenever the phase returns to idle
    pub idle: Notify,
    pub metrics: Arc<BatcherMetrics>,
}

impl<I, O> Inner<I, O> {
    pub fn lock_state(&self) -> MutexGuard<'_, BatcherState<I, O>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self) -> bool {
        self.lock_state().phase == Phase::Idle
    }
}

impl<I: Send + 'static, O: Send + 'static> Inner<I, O> {
    /// Schedule a dispatch after `batch_frequency`
    fn arm_timer(self: &Arc<Self>, state: &mut BatcherState<I, O>) {
        let generation = state.next_timer_generation;
        state.next_timer_generation += 1;

        let delay = self.config.batch_frequency;
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_timer(generation);
        });

        state.timer = Some(ArmedTimer { generation, handle });
        debug!(delay_ms = delay.as_millis() as u64, "Batch timer armed");
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut state = self.lock_state();
            match &state.timer {
                Some(timer) if timer.generation == generation => {}
                // cancelled after it had already woken up
                _ => return,
            }
            state.timer = None;

            if !state.accepting || !gate::timer_should_dispatch(state.phase, state.queue.len()) {
                debug!(phase = ?state.phase, queue_depth = state.queue.len(), "Batch timer fired, nothing to dispatch");
                return;
            }
            state.begin_dispatch(self.config.batch_size)
        };

        self.spawn_dispatch(batch, DispatchTrigger::Timer);
    }

    /// Run the drain loop for `batch` on its own task
    pub fn spawn_dispatch(self: &Arc<Self>, batch: Vec<JobRecord<I, O>>, trigger: DispatchTrigger) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.drain(batch, trigger).await;
        });
    }
}

/// Aggregates individually submitted jobs into batches
///
/// A batch is dispatched as soon as `batch_size` jobs are queued while no
/// batch is in flight, or when `batch_frequency` has elapsed since the first
/// unbatched submission. At most one batch is in flight at a time; backlog
/// that builds up meanwhile is drained batch after batch once it completes.
///
/// Clones share the same queue. Submitting spawns tokio tasks, so it must
/// happen inside a tokio runtime.
pub struct MicroBatcher<I, O> {
    pub(crate) inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for MicroBatcher<I, O> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<I: Send + 'static, O: Send + 'static> MicroBatcher<I, O> {
    /// Create a batcher around `processor`
    ///
    /// Fails if the config cannot drive a batcher (zero batch size).
    pub fn new<P>(processor: P, config: BatcherConfig) -> Result<Self, ConfigError>
    where
        P: BatchProcessor<I, O>,
    {
        config.validate()?;
        Ok(Self::build(Box::new(processor), config))
    }

    /// Create a batcher with the default config (10 jobs, 1 second)
    pub fn with_defaults<P>(processor: P) -> Self
    where
        P: BatchProcessor<I, O>,
    {
        Self::build(Box::new(processor), BatcherConfig::default())
    }

    fn build(processor: Box<dyn BatchProcessor<I, O>>, config: BatcherConfig) -> Self {
        debug!(
            batch_size = config.batch_size,
            batch_frequency_ms = config.batch_frequency.as_millis() as u64,
            shutdown_policy = ?config.shutdown_policy,
            "Creating micro-batcher"
        );

        let inner = Inner {
            config,
            processor,
            state: Mutex::new(BatcherState::new()),
            idle: Notify::new(),
            metrics: Arc::new(BatcherMetrics::new()),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Submit a job whose input is still being computed
    ///
    /// The input starts running right away on its own task and is awaited
    /// when the job's batch is dispatched. If it fails, only this job fails.
    /// After shutdown has been requested the input is dropped unstarted and
    /// the returned handle resolves to `JobError::ShuttingDown`.
    pub fn submit_job<F>(&self, input: F) -> JobHandle<O>
    where
        F: Future<Output = Result<I, BoxError>> + Send + 'static,
    {
        let inner = &self.inner;
        inner.metrics.record_submitted();

        let (handle, batch) = {
            let mut state = inner.lock_state();
            if !state.accepting {
                drop(state);
                inner.metrics.record_rejected();
                let handle = JobHandle::failed(JobError::ShuttingDown);
                debug!(job_id = %handle.id(), "Job rejected, batcher is shutting down");
                return handle;
            }

            let (record, handle) = JobRecord::new(input);
            let job_id = record.id;
            state.queue.push(record);
            inner.metrics.record_queued();
            let queue_depth = state.queue.len();
            debug!(%job_id, queue_depth, "Job enqueued");

            let batch = match gate::decide(
                state.phase,
                queue_depth,
                inner.config.batch_size,
                state.timer.is_some(),
            ) {
                GateDecision::DispatchNow => Some(state.begin_dispatch(inner.config.batch_size)),
                GateDecision::ArmTimer => {
                    inner.arm_timer(&mut state);
                    None
                }
                GateDecision::Wait => None,
            };
            (handle, batch)
        };

        if let Some(batch) = batch {
            inner.spawn_dispatch(batch, DispatchTrigger::Size);
        }
        handle
    }

    /// Submit a job whose input is already known
    pub fn submit(&self, input: I) -> JobHandle<O> {
        self.submit_job(async move { Ok(input) })
    }

    /// Whether a batch is currently in flight
    pub fn is_processing(&self) -> bool {
        self.phase() == Phase::Dispatching
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_state().phase
    }

    /// Number of jobs waiting for a batch
    pub fn queue_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Ids of the jobs waiting for a batch, oldest first
    pub fn pending_job_ids(&self) -> Vec<JobId> {
        self.inner.lock_state().queue.ids()
    }

    /// Whether a frequency timer is currently armed
    pub fn has_pending_timer(&self) -> bool {
        self.inner.lock_state().timer.is_some()
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.lock_state().accepting
    }

    /// Whether shutdown has completed
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock_state().shut_down
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Arc<BatcherMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}
