//! Micro-batching of individually submitted jobs.
//!
//! Callers submit jobs one at a time and get a handle to each job's own
//! outcome. The batcher groups queued jobs into batches for a single
//! [`BatchProcessor`] call, so the processor runs less often and its fixed
//! cost is amortized.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    submit_job(input)                     │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │
//!                    ┌────────▼────────┐
//!                    │    JobQueue     │ ← FIFO, unbounded
//!                    └────────┬────────┘
//!                             │
//!                    ┌────────▼────────┐
//!                    │      Gate       │ ← dispatch now / arm timer / wait
//!                    └────────┬────────┘
//!                             │
//!                    ┌────────▼────────┐
//!                    │   Dispatcher    │ ← one batch in flight, drains backlog
//!                    └────────┬────────┘
//!                             │
//!                    ┌────────▼────────┐
//!                    │ BatchProcessor  │ ← caller supplied
//!                    └─────────────────┘
//! ```
//!
//! # Features
//!
//! - **Size or time flushing**: a batch goes out once `batch_size` jobs are
//!   queued, or `batch_frequency` after the first unbatched job
//! - **Single flight**: never more than one batch in the processor
//! - **Backlog draining**: leftover jobs follow immediately, batch by batch
//! - **Isolated failures**: a failing input only fails its own job
//! - **Graceful shutdown**: waits for the in-flight batch, configurable fate
//!   for queued jobs
//! - **Metrics**: queue depth, wait times, batch sizes and dispatch triggers

mod config;
mod dispatcher;
mod gate;
mod metrics;
mod microbatcher;
mod processor;
mod queue;
mod shutdown;

pub use config::{BatcherConfig, ShutdownPolicy, DEFAULT_BATCH_FREQUENCY, DEFAULT_BATCH_SIZE};
pub use gate::{decide, GateDecision, Phase};
pub use metrics::{BatcherMetrics, DispatchTrigger, JobTimer, MetricsSnapshot};
pub use microbatcher::MicroBatcher;
pub use processor::BatchProcessor;
pub use queue::{JobHandle, JobId, JobInput, JobOutcome, JobQueue, JobRecord, JobSettler};
