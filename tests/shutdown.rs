//! Shutdown behavior with and without a batch in flight

mod common;

use std::time::Duration;

use common::{init_tracing, owned, Recorder};
use futures::FutureExt;
use microbatch::{BatcherConfig, BoxError, JobError, MicroBatcher, ShutdownPolicy};
use tokio::time::Instant;

fn batcher(recorder: &Recorder, size: usize, policy: ShutdownPolicy) -> MicroBatcher<String, String> {
    let config = BatcherConfig::new(size, Duration::from_millis(20)).with_shutdown_policy(policy);
    MicroBatcher::new(recorder.clone(), config).unwrap()
}

/// Input that takes `ms` to resolve
async fn slow_input(value: &'static str, ms: u64) -> Result<String, BoxError> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(value.to_string())
}

#[tokio::test(start_paused = true)]
async fn test_idle_shutdown_returns_immediately() {
    init_tracing();
    let recorder = Recorder::default();
    let batcher = batcher(&recorder, 10, ShutdownPolicy::Discard);
    let started = Instant::now();

    batcher.shutdown().await;

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(!batcher.is_processing());
    assert!(batcher.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_batch() {
    init_tracing();
    let recorder = Recorder::default();
    let batcher = batcher(&recorder, 1, ShutdownPolicy::Discard);
    let started = Instant::now();

    let job = batcher.submit_job(slow_input("late", 50));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(batcher.is_processing());

    batcher.shutdown().await;

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(!batcher.is_processing());
    // settled before shutdown returned
    assert_eq!(job.now_or_never().unwrap().unwrap(), "LATE");
}

#[tokio::test(start_paused = true)]
async fn test_submission_during_shutdown_wait_is_rejected() {
    init_tracing();
    let recorder = Recorder::default();
    let batcher = batcher(&recorder, 1, ShutdownPolicy::Discard);

    let first = batcher.submit_job(slow_input("first", 50));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let shutdown = tokio::spawn({
        let batcher = batcher.clone();
        async move { batcher.shutdown().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!batcher.is_accepting());
    assert!(!batcher.is_shut_down());

    let late = batcher.submit("late".to_string());
    assert!(matches!(late.await, Err(JobError::ShuttingDown)));

    shutdown.await.unwrap();
    assert_eq!(first.await.unwrap(), "FIRST");
    assert_eq!(recorder.batches(), vec![owned(&["first"])]);
}

#[tokio::test(start_paused = true)]
async fn test_discard_drops_backlog() {
    init_tracing();
    let recorder = Recorder::with_delay(Duration::from_millis(50));
    let batcher = batcher(&recorder, 2, ShutdownPolicy::Discard);

    let handles: Vec<_> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|s| batcher.submit(s.to_string()))
        .collect();
    batcher.shutdown().await;

    let mut settled = 0;
    let mut discarded = 0;
    for handle in handles {
        match handle.await {
            Ok(_) => settled += 1,
            Err(JobError::Discarded) => discarded += 1,
            Err(err) => panic!("unexpected failure: {err}"),
        }
    }

    assert_eq!((settled, discarded), (2, 3));
    let snapshot = batcher.metrics_snapshot();
    assert_eq!(snapshot.jobs_completed, snapshot.jobs_submitted - snapshot.jobs_discarded);
    assert_eq!(recorder.batches(), vec![owned(&["a", "b"])]);
}

#[tokio::test(start_paused = true)]
async fn test_reject_settles_backlog_with_error() {
    init_tracing();
    let recorder = Recorder::with_delay(Duration::from_millis(50));
    let batcher = batcher(&recorder, 2, ShutdownPolicy::Reject);

    let a = batcher.submit("a".to_string());
    let b = batcher.submit("b".to_string());
    let c = batcher.submit("c".to_string());
    batcher.shutdown().await;

    assert_eq!(a.await.unwrap(), "A");
    assert_eq!(b.await.unwrap(), "B");
    let err = c.await.unwrap_err();
    assert!(matches!(err, JobError::Shutdown));
    assert!(err.is_shutdown());
    assert!(!batcher.has_pending_timer());
    let snapshot = batcher.metrics_snapshot();
    assert_eq!(snapshot.jobs_shutdown_rejected, 1);
    assert_eq!(snapshot.jobs_discarded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_flushes_backlog_before_completing() {
    init_tracing();
    let recorder = Recorder::with_delay(Duration::from_millis(10));
    let batcher = batcher(&recorder, 2, ShutdownPolicy::Drain);

    let handles: Vec<_> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|s| batcher.submit(s.to_string()))
        .collect();
    batcher.shutdown().await;

    for handle in handles {
        assert!(handle.now_or_never().unwrap().is_ok());
    }
    assert_eq!(
        recorder.batches(),
        vec![owned(&["a", "b"]), owned(&["c", "d"]), owned(&["e"])]
    );

    let snapshot = batcher.metrics_snapshot();
    assert_eq!(snapshot.size_triggered, 1);
    assert_eq!(snapshot.shutdown_triggered, 2);
    assert_eq!(snapshot.jobs_discarded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_shutdowns_both_complete() {
    init_tracing();
    let recorder = Recorder::with_delay(Duration::from_millis(30));
    let batcher = batcher(&recorder, 1, ShutdownPolicy::Reject);
    let job = batcher.submit("x".to_string());

    let other = batcher.clone();
    tokio::join!(batcher.shutdown(), other.shutdown());

    assert!(batcher.is_shut_down());
    assert_eq!(job.await.unwrap(), "X");
}
