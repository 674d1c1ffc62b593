//! Configuration for the micro-batcher.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of jobs per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default time to wait before flushing an undersized batch
pub const DEFAULT_BATCH_FREQUENCY: Duration = Duration::from_millis(1000);

/// What happens to jobs that are still queued when shutdown completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Drop queued jobs; their handles resolve to `JobError::Discarded`
    #[default]
    Discard,
    /// Settle queued jobs with `JobError::Shutdown`
    Reject,
    /// Flush queued jobs through final batches before quiescing
    Drain,
}

impl FromStr for ShutdownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "reject" => Ok(Self::Reject),
            "drain" => Ok(Self::Drain),
            _ => Err(ConfigError::invalid_env(ENV_SHUTDOWN_POLICY, s)),
        }
    }
}

const ENV_BATCH_SIZE: &str = "MICROBATCH_BATCH_SIZE";
const ENV_BATCH_FREQUENCY_MS: &str = "MICROBATCH_BATCH_FREQUENCY_MS";
const ENV_SHUTDOWN_POLICY: &str = "MICROBATCH_SHUTDOWN_POLICY";

/// Configuration for the micro-batcher
#[derive(Debug, Clone, PartialEq)]
pub struct BatcherConfig {
    /// Number of queued jobs that triggers an immediate dispatch,
    /// and the maximum number of jobs handed to the processor at once
    pub batch_size: usize,

    /// Maximum time a job waits for its batch to fill
    pub batch_frequency: Duration,

    /// Fate of queued jobs at shutdown
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_frequency: DEFAULT_BATCH_FREQUENCY,
            shutdown_policy: ShutdownPolicy::Discard,
        }
    }
}

impl BatcherConfig {
    /// Create a config with the given size and frequency, default policy
    pub fn new(batch_size: usize, batch_frequency: Duration) -> Self {
        Self {
            batch_size,
            batch_frequency,
            ..Self::default()
        }
    }

    /// Set the shutdown policy
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Create config optimized for low latency (small batches, short wait)
    pub fn low_latency() -> Self {
        Self {
            batch_size: 4,
            batch_frequency: Duration::from_millis(5),
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }

    /// Create config optimized for high throughput (large batches, longer wait)
    pub fn high_throughput() -> Self {
        Self {
            batch_size: 128,
            batch_frequency: Duration::from_millis(250),
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }

    /// Check that the config can drive a batcher
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    /// Create config from environment variables
    ///
    /// Missing, unparsable or zero values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_BATCH_SIZE) {
            if let Ok(n) = val.parse::<usize>() {
                if n > 0 {
                    config.batch_size = n;
                }
            }
        }

        if let Ok(val) = std::env::var(ENV_BATCH_FREQUENCY_MS) {
            if let Ok(n) = val.parse::<u64>() {
                if n > 0 {
                    config.batch_frequency = Duration::from_millis(n);
                }
            }
        }

        if let Ok(val) = std::env::var(ENV_SHUTDOWN_POLICY) {
            if let Ok(policy) = val.parse() {
                config.shutdown_policy = policy;
            }
        }

        config
    }

    /// Create config from environment variables, failing on bad values
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_BATCH_SIZE) {
            config.batch_size = val
                .parse()
                .map_err(|_| ConfigError::invalid_env(ENV_BATCH_SIZE, val.as_str()))?;
        }

        if let Ok(val) = std::env::var(ENV_BATCH_FREQUENCY_MS) {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::invalid_env(ENV_BATCH_FREQUENCY_MS, val.as_str()))?;
            config.batch_frequency = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var(ENV_SHUTDOWN_POLICY) {
            config.shutdown_policy = val.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}
