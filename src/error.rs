//! Error types for the micro-batcher.
//!
//! # Error Hierarchy
//!
//! ```text
//! JobError     - per-job outcome failures, delivered through a JobHandle
//! ConfigError  - invalid BatcherConfig, rejected at construction
//! ```
//!
//! `JobError` is `Clone` because a single processor failure is fanned out to
//! every job of the batch. Caller supplied errors are kept behind an `Arc` so
//! the original error stays reachable through `source()`.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by job inputs and batch processors
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared error, fanned out to several jobs
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Outcome failure of a single job
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// The job's own input failed before it reached the processor
    #[error("Job input failed: {0}")]
    Input(#[source] SharedError),

    /// The batch processor failed as a whole
    #[error("Batch processor failed: {0}")]
    Processor(#[source] SharedError),

    /// The batch processor panicked while handling the batch
    #[error("Batch processor panicked")]
    ProcessorPanicked,

    /// The processor returned fewer results than it was given inputs
    #[error("Batch processor returned {actual} results for {expected} inputs")]
    ResultCountMismatch { expected: usize, actual: usize },

    /// Submitted after shutdown was requested
    #[error("Batcher is shutting down, job not accepted")]
    ShuttingDown,

    /// Still queued when shutdown finalized the queue
    #[error("Batcher shut down before the job was dispatched")]
    Shutdown,

    /// Dropped without ever being settled
    #[error("Job was discarded without a result")]
    Discarded,
}

impl JobError {
    /// Create an input failure
    pub fn input(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        Self::Input(Arc::from(err))
    }

    /// Create a processor failure
    pub fn processor(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        Self::Processor(Arc::from(err))
    }

    /// Whether this failure came from shutdown rather than from processing
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Shutdown | Self::Discarded)
    }
}

/// Invalid batcher configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A batch must hold at least one job
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    /// An environment variable held a value that could not be used
    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}

impl ConfigError {
    /// Create an invalid environment value error
    pub fn invalid_env(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            value: value.into(),
        }
    }
}
