//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use microbatch::{BatchProcessor, BoxError};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Upper-cases its inputs and remembers every batch it was given
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
    delay: Duration,
}

impl Recorder {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchProcessor<String, String> for Recorder {
    fn process(&self, inputs: Vec<String>) -> BoxFuture<'static, Result<Vec<String>, BoxError>> {
        let batches = Arc::clone(&self.batches);
        let delay = self.delay;
        async move {
            batches.lock().unwrap().push(inputs.clone());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(inputs.into_iter().map(|s| s.to_uppercase()).collect())
        }
        .boxed()
    }
}

pub fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
