//! Metrics for the micro-batcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// What caused a batch to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    /// The queue reached `batch_size` while idle
    Size,
    /// The batch frequency timer fired
    Timer,
    /// Backlog left over after the previous batch completed
    Drain,
    /// Final flush requested by shutdown
    Shutdown,
}

impl DispatchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Drain => "drain",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Metrics for monitoring batcher behaviour
#[derive(Debug, Default)]
pub struct BatcherMetrics {
    /// Total jobs submitted (accepted or not)
    pub jobs_submitted: AtomicU64,

    /// Jobs currently waiting in the queue
    pub jobs_queued: AtomicU64,

    /// Jobs currently part of an in-flight batch
    pub jobs_processing: AtomicU64,

    /// Jobs settled with a value
    pub jobs_completed: AtomicU64,

    /// Jobs settled with an input or processor failure
    pub jobs_failed: AtomicU64,

    /// Jobs refused because shutdown had been requested
    pub jobs_rejected: AtomicU64,

    /// Queued jobs dropped or rejected by shutdown
    pub jobs_discarded: AtomicU64,

    /// Queued jobs settled with an error by shutdown
    pub jobs_shutdown_rejected: AtomicU64,

    /// Total queue wait time in milliseconds (for averaging)
    pub total_queue_wait_ms: AtomicU64,

    /// Total batch processing time in milliseconds (for averaging)
    pub total_processing_ms: AtomicU64,

    /// Maximum queue depth observed
    pub max_queue_depth: AtomicU64,

    /// Number of batches dispatched
    pub batches_dispatched: AtomicU64,

    /// Batches dispatched because the queue reached batch size
    pub size_triggered: AtomicU64,

    /// Batches dispatched by the frequency timer
    pub timer_triggered: AtomicU64,

    /// Batches dispatched while draining backlog
    pub drain_triggered: AtomicU64,

    /// Batches dispatched by a draining shutdown
    pub shutdown_triggered: AtomicU64,

    /// Total jobs in batches (for batch size averaging)
    pub total_batch_jobs: AtomicU64,

    /// Batches whose processor call failed or panicked
    pub batches_failed: AtomicU64,
}

impl BatcherMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job submission
    pub fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job entering the queue
    pub fn record_queued(&self) {
        let queued = self.jobs_queued.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_queue_depth.fetch_max(queued, Ordering::Relaxed);
    }

    /// Record a job refused at submission
    pub fn record_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch leaving the queue
    pub fn record_batch(&self, batch_size: usize, trigger: DispatchTrigger) {
        let size = batch_size as u64;
        self.jobs_queued.fetch_sub(size, Ordering::Relaxed);
        self.jobs_processing.fetch_add(size, Ordering::Relaxed);
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.total_batch_jobs.fetch_add(size, Ordering::Relaxed);

        let counter = match trigger {
            DispatchTrigger::Size => &self.size_triggered,
            DispatchTrigger::Timer => &self.timer_triggered,
            DispatchTrigger::Drain => &self.drain_triggered,
            DispatchTrigger::Shutdown => &self.shutdown_triggered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a job waited before its batch started
    pub fn record_queue_wait(&self, wait_time: Duration) {
        self.total_queue_wait_ms
            .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a job settled with a value
    pub fn record_completed(&self) {
        self.jobs_processing.fetch_sub(1, Ordering::Relaxed);
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job settled with a failure
    pub fn record_failed(&self) {
        self.jobs_processing.fetch_sub(1, Ordering::Relaxed);
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch that finished, successfully or not
    pub fn record_batch_finished(&self, processing_time: Duration, failed: bool) {
        self.total_processing_ms
            .fetch_add(processing_time.as_millis() as u64, Ordering::Relaxed);
        if failed {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record queued jobs dropped unsettled by shutdown
    pub fn record_discarded(&self, count: usize) {
        let count = count as u64;
        self.jobs_queued.fetch_sub(count, Ordering::Relaxed);
        self.jobs_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Record queued jobs settled with an error by shutdown
    pub fn record_shutdown_rejected(&self, count: usize) {
        let count = count as u64;
        self.jobs_queued.fetch_sub(count, Ordering::Relaxed);
        self.jobs_shutdown_rejected.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current queue depth
    pub fn queue_depth(&self) -> u64 {
        self.jobs_queued.load(Ordering::Relaxed)
    }

    /// Get number of jobs in the in-flight batch
    pub fn processing_count(&self) -> u64 {
        self.jobs_processing.load(Ordering::Relaxed)
    }

    /// Jobs that reached a final outcome through a batch
    pub fn settled_count(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed) + self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Calculate average queue wait time in milliseconds, over dispatched jobs
    pub fn avg_queue_wait_ms(&self) -> f64 {
        let dispatched = self.total_batch_jobs.load(Ordering::Relaxed);
        if dispatched == 0 {
            return 0.0;
        }
        self.total_queue_wait_ms.load(Ordering::Relaxed) as f64 / dispatched as f64
    }

    /// Calculate average batch processing time in milliseconds
    pub fn avg_processing_ms(&self) -> f64 {
        let batches = self.batches_dispatched.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.total_processing_ms.load(Ordering::Relaxed) as f64 / batches as f64
    }

    /// Calculate average batch size
    pub fn avg_batch_size(&self) -> f64 {
        let batches = self.batches_dispatched.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.total_batch_jobs.load(Ordering::Relaxed) as f64 / batches as f64
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_queued: self.jobs_queued.load(Ordering::Relaxed),
            jobs_processing: self.jobs_processing.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            jobs_discarded: self.jobs_discarded.load(Ordering::Relaxed),
            jobs_shutdown_rejected: self.jobs_shutdown_rejected.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            size_triggered: self.size_triggered.load(Ordering::Relaxed),
            timer_triggered: self.timer_triggered.load(Ordering::Relaxed),
            drain_triggered: self.drain_triggered.load(Ordering::Relaxed),
            shutdown_triggered: self.shutdown_triggered.load(Ordering::Relaxed),
            avg_queue_wait_ms: self.avg_queue_wait_ms(),
            avg_processing_ms: self.avg_processing_ms(),
            avg_batch_size: self.avg_batch_size(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_queued: u64,
    pub jobs_processing: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_rejected: u64,
    pub jobs_discarded: u64,
    pub jobs_shutdown_rejected: u64,
    pub max_queue_depth: u64,
    pub batches_dispatched: u64,
    pub batches_failed: u64,
    pub size_triggered: u64,
    pub timer_triggered: u64,
    pub drain_triggered: u64,
    pub shutdown_triggered: u64,
    pub avg_queue_wait_ms: f64,
    pub avg_processing_ms: f64,
    pub avg_batch_size: f64,
}

/// Timer for tracking a job from submission to dispatch
#[derive(Debug, Clone, Copy)]
pub struct JobTimer {
    pub queued_at: Instant,
    pub started_at: Option<Instant>,
}

impl JobTimer {
    pub fn new() -> Self {
        Self { queued_at: Instant::now(), started_at: None }
    }

    pub fn start_processing(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn queue_wait_time(&self) -> Duration {
        self.started_at
            .map(|s| s.duration_since(self.queued_at))
            .unwrap_or_else(|| self.queued_at.elapsed())
    }
}

impl Default for JobTimer {
    fn default() -> Self {
        Self::new()
    }
}
