//! Job Queue Fabric Port
//!
//! Five named durable queues with per-queue retry/backoff/TTL policy.
//! Producers and the control surface talk to [`QueueFabric`]; worker pools
//! are wired to a [`JobHandler`] per queue at process start. Delivery is
//! at-least-once: handlers must be idempotent, and a retry may re-execute
//! any prefix of a handler's side effects.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The five queues of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    /// Post-intake bookkeeping per error log
    ErrorProcessing,
    /// AI diagnosis orchestration
    AiDiagnosis,
    /// Alert email delivery
    EmailNotification,
    /// Stack-frame resolution against source maps
    SourcemapProcessing,
    /// Fingerprint rollup into aggregations
    ErrorAggregation,
}

impl QueueName {
    /// All queues, in registration order
    pub const ALL: [Self; 5] = [
        Self::ErrorProcessing,
        Self::AiDiagnosis,
        Self::EmailNotification,
        Self::SourcemapProcessing,
        Self::ErrorAggregation,
    ];

    /// Wire name of the queue
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorProcessing => "error-processing",
            Self::AiDiagnosis => "ai-diagnosis",
            Self::EmailNotification => "email-notification",
            Self::SourcemapProcessing => "sourcemap-processing",
            Self::ErrorAggregation => "error-aggregation",
        }
    }

    /// Parse the wire name
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.as_str() == s)
    }

    /// The fixed policy of this queue
    pub fn policy(&self) -> QueuePolicy {
        match self {
            Self::ErrorProcessing => QueuePolicy {
                max_attempts: 3,
                backoff: BackoffKind::Exponential,
                base_delay: Duration::from_secs(1),
                retention_completed: 200,
                retention_failed: 100,
                stalled_after: Duration::from_secs(30),
                initial_delay: Duration::ZERO,
                max_stalled: 1,
                job_timeout: Duration::from_secs(30),
            },
            Self::AiDiagnosis => QueuePolicy {
                max_attempts: 2,
                backoff: BackoffKind::Exponential,
                base_delay: Duration::from_secs(5),
                retention_completed: 50,
                retention_failed: 25,
                stalled_after: Duration::from_secs(60),
                initial_delay: Duration::from_secs(2),
                max_stalled: 1,
                job_timeout: Duration::from_secs(120),
            },
            Self::EmailNotification => QueuePolicy {
                max_attempts: 5,
                backoff: BackoffKind::Exponential,
                base_delay: Duration::from_secs(3),
                retention_completed: 100,
                retention_failed: 50,
                stalled_after: Duration::from_secs(30),
                initial_delay: Duration::ZERO,
                max_stalled: 2,
                job_timeout: Duration::from_secs(30),
            },
            Self::SourcemapProcessing => QueuePolicy {
                max_attempts: 2,
                backoff: BackoffKind::Fixed,
                base_delay: Duration::from_secs(2),
                retention_completed: 50,
                retention_failed: 25,
                stalled_after: Duration::from_secs(45),
                initial_delay: Duration::ZERO,
                max_stalled: 1,
                job_timeout: Duration::from_secs(30),
            },
            Self::ErrorAggregation => QueuePolicy {
                max_attempts: 3,
                backoff: BackoffKind::Exponential,
                base_delay: Duration::from_secs(2),
                retention_completed: 100,
                retention_failed: 50,
                stalled_after: Duration::from_secs(60),
                initial_delay: Duration::ZERO,
                max_stalled: 1,
                job_timeout: Duration::from_secs(30),
            },
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry delay growth strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay on every attempt
    Fixed,
    /// Delay doubles per attempt
    Exponential,
}

/// Fixed per-queue behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Attempts before a job lands in `failed`
    pub max_attempts: u32,
    /// Retry delay growth
    pub backoff: BackoffKind,
    /// First retry delay
    pub base_delay: Duration,
    /// Completed jobs retained before `clean`
    pub retention_completed: usize,
    /// Failed jobs retained before `clean`
    pub retention_failed: usize,
    /// Heartbeat silence after which an active job counts as stalled
    pub stalled_after: Duration,
    /// Delay applied to every freshly added job
    pub initial_delay: Duration,
    /// Times a stalled job is returned to waiting before failing
    pub max_stalled: u32,
    /// Deadline for one handler invocation
    pub job_timeout: Duration,
}

impl QueuePolicy {
    /// Delay before retrying after failed attempt number `attempt` (base-1)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        }
    }
}

/// Advisory job priorities; ties broken FIFO
pub mod priority {
    /// Jump the queue
    pub const CRITICAL: i8 = 10;
    /// Ahead of normal traffic
    pub const HIGH: i8 = 5;
    /// Default
    pub const NORMAL: i8 = 0;
    /// Behind everything else
    pub const LOW: i8 = -5;
}

/// Per-job enqueue options
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Advisory priority (see [`priority`])
    pub priority: i8,
    /// Extra delay on top of the queue's initial delay
    pub delay: Option<Duration>,
}

impl JobOptions {
    /// Options with the given priority
    pub fn with_priority(priority: i8) -> Self {
        Self {
            priority,
            delay: None,
        }
    }
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to be picked up
    Waiting,
    /// Held by a worker
    Active,
    /// Finished successfully
    Completed,
    /// Exhausted its attempts
    Failed,
    /// Waiting for its delay to elapse
    Delayed,
}

/// Per-state job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Jobs ready to run
    pub waiting: u64,
    /// Jobs held by workers
    pub active: u64,
    /// Retained completed jobs
    pub completed: u64,
    /// Retained failed jobs
    pub failed: u64,
    /// Jobs whose delay has not elapsed
    pub delayed: u64,
}

/// A job as seen by its handler
#[derive(Debug, Clone)]
pub struct ActiveJob {
    /// Job identifier (used as the log correlation id)
    pub id: String,
    /// Queue the job came from
    pub queue: QueueName,
    /// Handler-defined job type tag
    pub job_type: String,
    /// JSON payload
    pub payload: serde_json::Value,
    /// Current attempt number (base-1)
    pub attempt: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
}

/// Consumer of one queue. Implementations must be idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one job; an `Err` re-raises into the retry pipeline
    async fn handle(&self, job: &ActiveJob) -> Result<()>;
}

/// Producer/management interface of the queue fabric
#[async_trait]
pub trait QueueFabric: Send + Sync {
    /// Enqueue a job and return its id
    async fn add(
        &self,
        queue: QueueName,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<String>;

    /// Stop handing out jobs from the queue
    async fn pause(&self, queue: QueueName) -> Result<()>;

    /// Resume a paused queue
    async fn resume(&self, queue: QueueName) -> Result<()>;

    /// Per-queue counts for all five queues
    async fn stats(&self) -> Result<Vec<(QueueName, QueueCounts)>>;

    /// Drop retained completed jobs older than `completed_older_than` and
    /// failed jobs older than `failed_older_than`; returns removed count
    async fn clean(
        &self,
        queue: QueueName,
        completed_older_than: Duration,
        failed_older_than: Duration,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_matches_the_design() {
        let p = QueueName::ErrorProcessing.policy();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_secs(1));
        assert_eq!(p.backoff, BackoffKind::Exponential);

        let p = QueueName::AiDiagnosis.policy();
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.initial_delay, Duration::from_secs(2));
        assert_eq!(p.job_timeout, Duration::from_secs(120));

        let p = QueueName::EmailNotification.policy();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.max_stalled, 2);

        let p = QueueName::SourcemapProcessing.policy();
        assert_eq!(p.backoff, BackoffKind::Fixed);
        assert_eq!(p.base_delay, Duration::from_secs(2));
        assert_eq!(p.stalled_after, Duration::from_secs(45));

        let p = QueueName::ErrorAggregation.policy();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.stalled_after, Duration::from_secs(60));
    }

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        let p = QueueName::ErrorAggregation.policy();
        assert_eq!(p.retry_delay(1), Duration::from_secs(2));
        assert_eq!(p.retry_delay(2), Duration::from_secs(4));
        assert_eq!(p.retry_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn fixed_backoff_stays_flat() {
        let p = QueueName::SourcemapProcessing.policy();
        assert_eq!(p.retry_delay(1), Duration::from_secs(2));
        assert_eq!(p.retry_delay(2), Duration::from_secs(2));
    }

    #[test]
    fn queue_names_round_trip() {
        for q in QueueName::ALL {
            assert_eq!(QueueName::parse(q.as_str()), Some(q));
        }
        assert_eq!(QueueName::parse("no-such-queue"), None);
    }
}
