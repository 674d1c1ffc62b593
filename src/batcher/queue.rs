//! Job records and the FIFO queue they wait in before dispatch.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::metrics::JobTimer;
use crate::error::{BoxError, JobError};

/// Identifier assigned to every submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Eventual input of a job
///
/// The input starts running on its own task as soon as the job is
/// submitted, so its latency overlaps the wait for a batch. Dropping an
/// unresolved input aborts that task.
pub struct JobInput<I> {
    task: JoinHandle<Result<I, BoxError>>,
}

impl<I: Send + 'static> JobInput<I> {
    /// Start resolving `input` in the background
    pub fn spawn<F>(input: F) -> Self
    where
        F: Future<Output = Result<I, BoxError>> + Send + 'static,
    {
        Self { task: tokio::spawn(input) }
    }
}

impl<I> Future for JobInput<I> {
    type Output = Result<I, JobError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(JobError::input(err))),
            Poll::Ready(Err(err)) if err.is_panic() => {
                Poll::Ready(Err(JobError::input("job input panicked")))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::input("job input cancelled"))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<I> Drop for JobInput<I> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<I> fmt::Debug for JobInput<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobInput")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Outcome delivered to the submitter of a job
pub type JobOutcome<O> = Result<O, JobError>;

/// A submitted job waiting for, or taking part in, a batch
pub struct JobRecord<I, O> {
    /// Identifier, shared with the caller's handle
    pub id: JobId,
    /// Input, already running
    pub input: JobInput<I>,
    /// Timer for tracking wait times
    pub timer: JobTimer,
    settle_tx: oneshot::Sender<JobOutcome<O>>,
}

impl<I: Send + 'static, O> JobRecord<I, O> {
    /// Create a record and the handle its submitter awaits
    ///
    /// Spawns the input, so it must be called inside a tokio runtime.
    pub fn new<F>(input: F) -> (Self, JobHandle<O>)
    where
        F: Future<Output = Result<I, BoxError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = JobId::new();
        let record = Self {
            id,
            input: JobInput::spawn(input),
            timer: JobTimer::new(),
            settle_tx: tx,
        };
        (record, JobHandle::new(id, rx))
    }
}

impl<I, O> JobRecord<I, O> {
    /// Split into the parts the dispatcher consumes separately
    pub fn into_parts(self) -> (JobInput<I>, JobSettler<O>) {
        let settler = JobSettler {
            id: self.id,
            timer: self.timer,
            tx: self.settle_tx,
        };
        (self.input, settler)
    }

    /// Settle without ever dispatching
    pub fn reject(self, err: JobError) {
        let _ = self.settle_tx.send(Err(err));
    }
}

impl<I, O> fmt::Debug for JobRecord<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

/// Capability to settle one job exactly once
///
/// Consumed by `settle`, so a second settlement cannot be expressed.
#[derive(Debug)]
pub struct JobSettler<O> {
    pub id: JobId,
    pub timer: JobTimer,
    tx: oneshot::Sender<JobOutcome<O>>,
}

impl<O> JobSettler<O> {
    /// Deliver the outcome; a dropped handle is not an error
    pub fn settle(self, outcome: JobOutcome<O>) {
        if self.tx.send(outcome).is_err() {
            tracing::trace!(job_id = %self.id, "Job handle dropped before settlement");
        }
    }
}

/// Handle to the eventual outcome of a submitted job
///
/// Resolves to `JobError::Discarded` if the job is dropped unsettled.
#[derive(Debug)]
pub struct JobHandle<O> {
    id: JobId,
    rx: oneshot::Receiver<JobOutcome<O>>,
}

impl<O> JobHandle<O> {
    fn new(id: JobId, rx: oneshot::Receiver<JobOutcome<O>>) -> Self {
        Self { id, rx }
    }

    /// Handle that is already settled with `err`
    pub(crate) fn failed(err: JobError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(JobId::new(), rx)
    }

    pub fn id(&self) -> JobId {
        self.id
    }
}

impl<O> Future for JobHandle<O> {
    type Output = JobOutcome<O>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::Discarded)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Unbounded FIFO of jobs awaiting dispatch
pub struct JobQueue<I, O> {
    jobs: VecDeque<JobRecord<I, O>>,
}

impl<I, O> JobQueue<I, O> {
    pub fn new() -> Self {
        Self { jobs: VecDeque::new() }
    }

    /// Append a job at the tail
    pub fn push(&mut self, job: JobRecord<I, O>) {
        self.jobs.push_back(job);
    }

    /// Remove up to `max` jobs from the head, preserving order
    pub fn take_batch(&mut self, max: usize) -> Vec<JobRecord<I, O>> {
        let n = max.min(self.jobs.len());
        self.jobs.drain(..n).collect()
    }

    /// Remove every queued job
    pub fn drain_all(&mut self) -> Vec<JobRecord<I, O>> {
        self.jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Ids of the queued jobs, head first
    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|job| job.id).collect()
    }
}

impl<I, O> Default for JobQueue<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn ready(value: u32) -> (JobRecord<u32, u32>, JobHandle<u32>) {
        JobRecord::new(async move { Ok(value) })
    }

    #[tokio::test]
    async fn test_take_batch_preserves_order() {
        let mut queue = JobQueue::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let (record, handle) = ready(i);
            ids.push(handle.id());
            queue.push(record);
        }

        let batch = queue.take_batch(2);
        assert_eq!(batch.iter().map(|j| j.id).collect::<Vec<_>>(), ids[..2]);
        assert_eq!(queue.ids(), ids[2..]);
    }

    #[tokio::test]
    async fn test_take_batch_short_queue() {
        let mut queue = JobQueue::new();
        queue.push(ready(1).0);

        let batch = queue.take_batch(10);
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.take_batch(10).is_empty());
    }

    #[tokio::test]
    async fn test_drain_all() {
        let mut queue = JobQueue::new();
        for i in 0..3 {
            queue.push(ready(i).0);
        }

        assert_eq!(queue.drain_all().len(), 3);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_settler_delivers_outcome() {
        let (record, handle) = ready(7);
        let (input, settler) = record.into_parts();

        let value = input.await.unwrap();
        settler.settle(Ok(value * 2));

        assert_eq!(handle.await.unwrap(), 14);
    }

    #[tokio::test]
    async fn test_dropped_record_resolves_discarded() {
        let (record, handle) = ready(1);
        drop(record);

        assert!(matches!(handle.await, Err(JobError::Discarded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_runs_before_dispatch() {
        let started = tokio::time::Instant::now();
        let (record, _handle) = JobRecord::<u32, u32>::new(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(3)
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        let (input, _settler) = record.into_parts();

        assert_eq!(input.await.unwrap(), 3);
        assert!(started.elapsed() < Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_input_is_aborted() {
        let finished = Arc::new(AtomicBool::new(false));
        let (record, _handle) = JobRecord::<u32, u32>::new({
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(1)
            }
        });

        drop(record);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_handle() {
        let handle = JobHandle::<u32>::failed(JobError::ShuttingDown);
        assert!(matches!(handle.await, Err(JobError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_rejected_record() {
        let (record, handle) = ready(1);
        record.reject(JobError::Shutdown);

        assert!(matches!(handle.await, Err(JobError::Shutdown)));
    }
}
