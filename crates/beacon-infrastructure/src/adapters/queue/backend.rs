//! Queue Backend Seam
//!
//! The fabric's storage contract. Two implementations exist: Redis for
//! durable multi-process deployments and an in-memory store for tests and
//! single-node runs. All timestamps are epoch milliseconds so records
//! serialize identically in both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use beacon_domain::error::Result;
use beacon_domain::ports::{JobState, QueueCounts, QueueName};

/// One job as stored by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Job identifier
    pub id: String,
    /// Owning queue
    pub queue: QueueName,
    /// Handler-defined type tag
    pub job_type: String,
    /// JSON payload
    pub payload: serde_json::Value,
    /// Advisory priority; ties broken by `seq`
    pub priority: i8,
    /// Attempts started so far (incremented by `pop`)
    pub attempts: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// Lifecycle state
    pub state: JobState,
    /// Earliest time the job may run
    pub run_at_ms: i64,
    /// Enqueue time
    pub created_at_ms: i64,
    /// FIFO tiebreaker assigned at enqueue
    pub seq: u64,
    /// Times the job was recovered from a stalled worker
    pub stalls: u32,
    /// Last worker heartbeat while active
    pub last_heartbeat_ms: i64,
    /// Most recent failure description
    pub last_error: Option<String>,
    /// When the job reached a terminal state
    pub finished_at_ms: Option<i64>,
}

/// Outcome of a stalled-job sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalledSweep {
    /// Jobs returned to waiting
    pub requeued: u32,
    /// Jobs that exceeded `max_stalled` and failed
    pub failed: u32,
}

/// Storage contract of the queue fabric.
///
/// `pop` is the only claim operation: it must hand each waiting job to at
/// most one caller, promote due delayed jobs first, honor the pause flag,
/// and order by priority (descending) then enqueue sequence (FIFO).
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Store a new job in `waiting` or `delayed` depending on `run_at_ms`
    async fn push(&self, record: JobRecord) -> Result<()>;

    /// Claim the next runnable job, marking it active and incrementing its
    /// attempt counter. Returns `None` when the queue is paused or empty.
    async fn pop(&self, queue: QueueName, now_ms: i64) -> Result<Option<JobRecord>>;

    /// Refresh the heartbeat of an active job
    async fn heartbeat(&self, queue: QueueName, id: &str, now_ms: i64) -> Result<()>;

    /// Move an active job to `completed`, trimming retention to `keep`
    async fn complete(&self, queue: QueueName, id: &str, now_ms: i64, keep: usize) -> Result<()>;

    /// Return an active job to `delayed` for another attempt
    async fn retry(&self, queue: QueueName, id: &str, run_at_ms: i64, error: &str) -> Result<()>;

    /// Move an active job to `failed`, trimming retention to `keep`
    async fn fail(
        &self,
        queue: QueueName,
        id: &str,
        error: &str,
        now_ms: i64,
        keep: usize,
    ) -> Result<()>;

    /// Recover active jobs whose heartbeat is older than `stalled_after_ms`
    async fn recover_stalled(
        &self,
        queue: QueueName,
        now_ms: i64,
        stalled_after_ms: i64,
        max_stalled: u32,
        keep_failed: usize,
    ) -> Result<StalledSweep>;

    /// Per-state counts
    async fn counts(&self, queue: QueueName) -> Result<QueueCounts>;

    /// Set or clear the pause flag
    async fn set_paused(&self, queue: QueueName, paused: bool) -> Result<()>;

    /// Read the pause flag
    async fn is_paused(&self, queue: QueueName) -> Result<bool>;

    /// Drop completed jobs finished before `completed_before_ms` and failed
    /// jobs finished before `failed_before_ms`; returns removed count
    async fn clean(
        &self,
        queue: QueueName,
        completed_before_ms: i64,
        failed_before_ms: i64,
    ) -> Result<u64>;
}
