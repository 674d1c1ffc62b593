//! The seam between the batcher and the caller's batch function.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::BoxError;

/// Processes a whole batch of job inputs in one call
///
/// Results are matched to jobs by position, so an implementation must return
/// them in input order. Failing the call fails every job of the batch; a
/// processor that needs per-item failures should encode them in `O` instead
/// (for example `O = Result<T, E>`).
pub trait BatchProcessor<I, O>: Send + Sync + 'static {
    fn process(&self, inputs: Vec<I>) -> BoxFuture<'static, Result<Vec<O>, BoxError>>;
}

impl<I, O, F, Fut> BatchProcessor<I, O> for F
where
    F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<O>, BoxError>> + Send + 'static,
{
    fn process(&self, inputs: Vec<I>) -> BoxFuture<'static, Result<Vec<O>, BoxError>> {
        (self)(inputs).boxed()
    }
}
