//! Job Queue Fabric
//!
//! # Overview
//! Implements the five-queue fabric of the pipeline: producers enqueue
//! through [`QueueService`] (the [`QueueFabric`] port), worker pools pull
//! through a [`QueueBackend`]. Policy — attempts, backoff, retention,
//! stall windows, deadlines — is fixed per queue in the domain.
//!
//! Backends: Redis for durable deployments, in-memory for tests and
//! single-node runs.

mod backend;
mod memory;
mod pool;
mod redis;

pub use backend::{JobRecord, QueueBackend, StalledSweep};
pub use memory::MemoryQueueBackend;
pub use pool::WorkerPool;
pub use redis::RedisQueueBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use beacon_domain::error::Result;
use beacon_domain::ports::{JobOptions, JobState, QueueCounts, QueueFabric, QueueName};

/// Producer/management facade over a backend
pub struct QueueService {
    backend: Arc<dyn QueueBackend>,
}

impl QueueService {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// The shared backend, for wiring worker pools
    pub fn backend(&self) -> Arc<dyn QueueBackend> {
        Arc::clone(&self.backend)
    }
}

#[async_trait]
impl QueueFabric for QueueService {
    async fn add(
        &self,
        queue: QueueName,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<String> {
        let policy = queue.policy();
        let now = Utc::now().timestamp_millis();
        let delay = policy.initial_delay + opts.delay.unwrap_or(Duration::ZERO);
        let id = Uuid::new_v4().to_string();
        let record = JobRecord {
            id: id.clone(),
            queue,
            job_type: job_type.to_owned(),
            payload,
            priority: opts.priority,
            attempts: 0,
            max_attempts: policy.max_attempts,
            state: JobState::Waiting,
            run_at_ms: now + delay.as_millis() as i64,
            created_at_ms: now,
            seq: 0,
            stalls: 0,
            last_heartbeat_ms: 0,
            last_error: None,
            finished_at_ms: None,
        };
        self.backend.push(record).await?;
        Ok(id)
    }

    async fn pause(&self, queue: QueueName) -> Result<()> {
        self.backend.set_paused(queue, true).await
    }

    async fn resume(&self, queue: QueueName) -> Result<()> {
        self.backend.set_paused(queue, false).await
    }

    async fn stats(&self) -> Result<Vec<(QueueName, QueueCounts)>> {
        let mut stats = Vec::with_capacity(QueueName::ALL.len());
        for queue in QueueName::ALL {
            stats.push((queue, self.backend.counts(queue).await?));
        }
        Ok(stats)
    }

    async fn clean(
        &self,
        queue: QueueName,
        completed_older_than: Duration,
        failed_older_than: Duration,
    ) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        self.backend
            .clean(
                queue,
                now - completed_older_than.as_millis() as i64,
                now - failed_older_than.as_millis() as i64,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_domain::ports::priority;

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    #[tokio::test]
    async fn add_respects_initial_delay() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());

        // ai-diagnosis carries a 2 s initial delay; it must land in delayed
        service
            .add(
                QueueName::AiDiagnosis,
                "analyze-error",
                serde_json::json!({}),
                JobOptions::default(),
            )
            .await
            .unwrap();
        let counts = backend.counts(QueueName::AiDiagnosis).await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.waiting, 0);

        // and become claimable once the delay elapses
        assert!(backend.pop(QueueName::AiDiagnosis, now_ms()).await.unwrap().is_none());
        let job = backend
            .pop(QueueName::AiDiagnosis, now_ms() + 2_100)
            .await
            .unwrap();
        assert!(job.is_some());
    }

    #[tokio::test]
    async fn priority_wins_and_ties_stay_fifo() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::ErrorProcessing;

        let low = service
            .add(q, "t", serde_json::json!({"n": 1}), JobOptions::with_priority(priority::LOW))
            .await
            .unwrap();
        let first_normal = service
            .add(q, "t", serde_json::json!({"n": 2}), JobOptions::default())
            .await
            .unwrap();
        let second_normal = service
            .add(q, "t", serde_json::json!({"n": 3}), JobOptions::default())
            .await
            .unwrap();
        let critical = service
            .add(
                q,
                "t",
                serde_json::json!({"n": 4}),
                JobOptions::with_priority(priority::CRITICAL),
            )
            .await
            .unwrap();

        let mut order = Vec::with_capacity(4);
        for _ in 0..4 {
            order.push(backend.pop(q, now_ms()).await.unwrap().unwrap().id);
        }
        assert_eq!(order, vec![critical, first_normal, second_normal, low]);
    }

    #[tokio::test]
    async fn pause_blocks_claims_until_resume() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::ErrorAggregation;

        service
            .add(q, "t", serde_json::json!({}), JobOptions::default())
            .await
            .unwrap();
        service.pause(q).await.unwrap();
        assert!(backend.pop(q, now_ms()).await.unwrap().is_none());
        service.resume(q).await.unwrap();
        assert!(backend.pop(q, now_ms()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn retry_returns_to_delayed_and_fail_is_terminal() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::SourcemapProcessing;

        let id = service
            .add(q, "t", serde_json::json!({}), JobOptions::default())
            .await
            .unwrap();
        let job = backend.pop(q, now_ms()).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts, 1);

        backend.retry(q, &id, now_ms() + 2_000, "transient").await.unwrap();
        let counts = backend.counts(q).await.unwrap();
        assert_eq!(counts.delayed, 1);

        // second (final for this queue) attempt fails terminally
        let job = backend.pop(q, now_ms() + 2_100).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        backend.fail(q, &id, "still broken", now_ms(), 25).await.unwrap();
        let counts = backend.counts(q).await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn stalled_job_is_requeued_then_failed() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::ErrorProcessing; // max_stalled = 1

        service
            .add(q, "t", serde_json::json!({}), JobOptions::default())
            .await
            .unwrap();
        let t0 = now_ms();
        let job = backend.pop(q, t0).await.unwrap().unwrap();

        // first stall: back to waiting
        let sweep = backend
            .recover_stalled(q, t0 + 40_000, 30_000, 1, 100)
            .await
            .unwrap();
        assert_eq!(sweep.requeued, 1);
        assert_eq!(sweep.failed, 0);

        // claimed again, stalls again: exceeds max_stalled and fails
        let t1 = t0 + 40_000;
        let job2 = backend.pop(q, t1).await.unwrap().unwrap();
        assert_eq!(job2.id, job.id);
        let sweep = backend
            .recover_stalled(q, t1 + 40_000, 30_000, 1, 100)
            .await
            .unwrap();
        assert_eq!(sweep.failed, 1);
        let counts = backend.counts(q).await.unwrap();
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn completed_retention_is_capped() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::ErrorProcessing;

        for _ in 0..5 {
            let id = service
                .add(q, "t", serde_json::json!({}), JobOptions::default())
                .await
                .unwrap();
            backend.pop(q, now_ms()).await.unwrap().unwrap();
            backend.complete(q, &id, now_ms(), 3).await.unwrap();
        }
        let counts = backend.counts(q).await.unwrap();
        assert_eq!(counts.completed, 3);
    }

    #[tokio::test]
    async fn clean_drops_old_terminal_jobs() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let service = QueueService::new(backend.clone());
        let q = QueueName::EmailNotification;

        let id = service
            .add(q, "t", serde_json::json!({}), JobOptions::default())
            .await
            .unwrap();
        backend.pop(q, now_ms()).await.unwrap();
        backend.complete(q, &id, now_ms() - 100_000, 100).await.unwrap();

        let removed = service
            .clean(q, Duration::from_secs(10), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
