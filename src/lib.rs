//! Microbatch Library
//!
//! Aggregates individually submitted asynchronous jobs into batches for a
//! downstream batch function, while every caller still receives its own
//! result.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use microbatch::{BatcherConfig, BoxError, MicroBatcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatcherConfig::new(2, Duration::from_millis(20));
//! let batcher: MicroBatcher<String, usize> = MicroBatcher::new(
//!     |words: Vec<String>| async move {
//!         Ok::<_, BoxError>(words.into_iter().map(|w| w.len()).collect::<Vec<usize>>())
//!     },
//!     config,
//! )?;
//!
//! let a = batcher.submit("hello".to_string());
//! let b = batcher.submit("batch".to_string());
//! assert_eq!(a.await?, 5);
//! assert_eq!(b.await?, 5);
//!
//! batcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod error;

pub use batcher::{
    BatchProcessor, BatcherConfig, BatcherMetrics, JobHandle, JobId, MetricsSnapshot, MicroBatcher,
    Phase, ShutdownPolicy,
};
pub use error::{BoxError, ConfigError, JobError};
