//! End-to-end worker pool behavior: retry spacing, completion counting,
//! and shutdown draining, against the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{ActiveJob, JobHandler, JobOptions, QueueFabric, QueueName};
use beacon_infrastructure::adapters::queue::{MemoryQueueBackend, QueueService, WorkerPool};

/// Fails the first `failures` attempts, then succeeds
struct FlakyHandler {
    failures: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &ActiveJob) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(Error::unavailable("transient backend outage"));
        }
        Ok(())
    }
}

async fn wait_for<F: Fn(beacon_domain::ports::QueueCounts) -> bool>(
    backend: &Arc<MemoryQueueBackend>,
    queue: QueueName,
    deadline: Duration,
    predicate: F,
) -> beacon_domain::ports::QueueCounts {
    use beacon_infrastructure::adapters::queue::QueueBackend;
    let start = Instant::now();
    loop {
        let counts = backend.counts(queue).await.unwrap();
        if predicate(counts) {
            return counts;
        }
        assert!(
            start.elapsed() < deadline,
            "queue never reached the expected state: {counts:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_retries_with_fixed_spacing_and_completes() {
    let backend = Arc::new(MemoryQueueBackend::new());
    let service = QueueService::new(backend.clone());
    let handler = Arc::new(FlakyHandler {
        failures: 1,
        attempts: AtomicU32::new(0),
    });
    let shutdown = CancellationToken::new();
    // sourcemap-processing: fixed 2 s backoff, 2 attempts
    let pool = WorkerPool::spawn(
        backend.clone(),
        QueueName::SourcemapProcessing,
        handler.clone(),
        1,
        Duration::from_millis(25),
        shutdown.clone(),
    );

    let started = Instant::now();
    service
        .add(
            QueueName::SourcemapProcessing,
            "resolve-error",
            serde_json::json!({"errorId": 1}),
            JobOptions::default(),
        )
        .await
        .unwrap();

    let counts = wait_for(
        &backend,
        QueueName::SourcemapProcessing,
        Duration::from_secs(10),
        |c| c.completed == 1,
    )
    .await;
    let elapsed = started.elapsed();

    // attempt 1 failed, attempt 2 succeeded after the 2 s fixed delay
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.completed, 1);
    assert!(
        elapsed >= Duration::from_secs(2),
        "retry fired early: {elapsed:?}"
    );

    shutdown.cancel();
    pool.join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_attempts_land_in_failed() {
    let backend = Arc::new(MemoryQueueBackend::new());
    let service = QueueService::new(backend.clone());
    let handler = Arc::new(FlakyHandler {
        failures: u32::MAX,
        attempts: AtomicU32::new(0),
    });
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        backend.clone(),
        QueueName::SourcemapProcessing,
        handler.clone(),
        1,
        Duration::from_millis(25),
        shutdown.clone(),
    );

    service
        .add(
            QueueName::SourcemapProcessing,
            "resolve-error",
            serde_json::json!({"errorId": 2}),
            JobOptions::default(),
        )
        .await
        .unwrap();

    let counts = wait_for(
        &backend,
        QueueName::SourcemapProcessing,
        Duration::from_secs(10),
        |c| c.failed == 1,
    )
    .await;
    assert_eq!(counts.completed, 0);
    // the queue allows exactly two attempts
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);

    shutdown.cancel();
    pool.join().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_claiming_new_jobs() {
    let backend = Arc::new(MemoryQueueBackend::new());
    let service = QueueService::new(backend.clone());
    let handler = Arc::new(FlakyHandler {
        failures: 0,
        attempts: AtomicU32::new(0),
    });
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        backend.clone(),
        QueueName::ErrorProcessing,
        handler.clone(),
        2,
        Duration::from_millis(25),
        shutdown.clone(),
    );

    shutdown.cancel();
    pool.join().await;

    // enqueued after shutdown: nobody claims it
    service
        .add(
            QueueName::ErrorProcessing,
            "process-error",
            serde_json::json!({"errorId": 3}),
            JobOptions::default(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    use beacon_infrastructure::adapters::queue::QueueBackend;
    let counts = backend.counts(QueueName::ErrorProcessing).await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.active, 0);
}
