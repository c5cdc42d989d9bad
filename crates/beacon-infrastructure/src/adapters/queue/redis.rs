//! Redis queue backend
//!
//! Durable backend over a shared Redis. Layout per queue, under the
//! `beacon:q:<name>` prefix:
//!
//! - `:jobs`      hash  id → serialized [`JobRecord`]
//! - `:waiting`   zset  score encodes (priority desc, enqueue seq asc)
//! - `:delayed`   zset  score = `run_at_ms`
//! - `:active`    zset  score = last heartbeat ms
//! - `:completed` zset  score = finished ms
//! - `:failed`    zset  score = finished ms
//! - `:paused`    string flag
//! - `beacon:q:seq` global counter for FIFO tiebreaks
//!
//! Claims ride on `ZPOPMIN`, which is atomic, so a waiting job reaches at
//! most one worker. Delivery stays at-least-once: a worker dying between
//! claim and completion leaves the job in `:active` for the stalled sweep.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{JobState, QueueCounts, QueueName};

use super::backend::{JobRecord, QueueBackend, StalledSweep};

/// Priority span folded into the waiting score; seq stays below this
const PRIORITY_SCALE: f64 = 1e13;

/// ConnectionManager-backed queue storage
pub struct RedisQueueBackend {
    conn: ConnectionManager,
}

impl RedisQueueBackend {
    /// Connect to the given Redis URL
    ///
    /// # Errors
    ///
    /// Returns a queue error when the client cannot be created or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::queue_with_source("invalid redis url", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::unavailable_with_source("redis connect failed", e))?;
        Ok(Self { conn })
    }

    fn key(queue: QueueName, part: &str) -> String {
        format!("beacon:q:{}:{part}", queue.as_str())
    }

    /// Waiting score: higher priority sorts first, FIFO inside a priority
    fn waiting_score(priority: i8, seq: u64) -> f64 {
        f64::from(-i32::from(priority)) * PRIORITY_SCALE + seq as f64
    }

    async fn load(&self, queue: QueueName, id: &str) -> Result<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(Self::key(queue, "jobs"), id)
            .await
            .map_err(|e| Error::queue_with_source("job load failed", e))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, record: &JobRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(record)?;
        let _: () = conn
            .hset(Self::key(record.queue, "jobs"), &record.id, raw)
            .await
            .map_err(|e| Error::queue_with_source("job store failed", e))?;
        Ok(())
    }

    /// Move every due delayed job into waiting
    async fn promote_due(&self, queue: QueueName, now_ms: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let due: Vec<String> = conn
            .zrangebyscore(Self::key(queue, "delayed"), f64::MIN, now_ms as f64)
            .await
            .map_err(|e| Error::queue_with_source("delayed scan failed", e))?;
        for id in due {
            // claim the promotion: only the caller that removes it moves it
            let removed: i64 = conn
                .zrem(Self::key(queue, "delayed"), &id)
                .await
                .map_err(|e| Error::queue_with_source("delayed claim failed", e))?;
            if removed == 0 {
                continue;
            }
            if let Some(mut job) = self.load(queue, &id).await? {
                job.state = JobState::Waiting;
                self.store(&job).await?;
                let _: () = conn
                    .zadd(
                        Self::key(queue, "waiting"),
                        &id,
                        Self::waiting_score(job.priority, job.seq),
                    )
                    .await
                    .map_err(|e| Error::queue_with_source("promotion failed", e))?;
            }
        }
        Ok(())
    }

    /// Trim a terminal zset to `keep` members, dropping their payloads
    async fn trim_terminal(&self, queue: QueueName, set: &str, keep: usize) -> Result<u64> {
        let mut conn = self.conn.clone();
        let set_key = Self::key(queue, set);
        let victims: Vec<String> = conn
            .zrange(&set_key, 0, -(keep as isize) - 1)
            .await
            .map_err(|e| Error::queue_with_source("retention scan failed", e))?;
        if victims.is_empty() {
            return Ok(0);
        }
        let _: () = conn
            .zrem(&set_key, &victims)
            .await
            .map_err(|e| Error::queue_with_source("retention trim failed", e))?;
        let _: () = conn
            .hdel(Self::key(queue, "jobs"), &victims)
            .await
            .map_err(|e| Error::queue_with_source("retention payload drop failed", e))?;
        Ok(victims.len() as u64)
    }

    /// Move one job between state sets and persist its record
    async fn transition(
        &self,
        queue: QueueName,
        job: &JobRecord,
        from: &str,
        to: &str,
        score: f64,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        self.store(job).await?;
        let _: () = conn
            .zrem(Self::key(queue, from), &job.id)
            .await
            .map_err(|e| Error::queue_with_source("state remove failed", e))?;
        let _: () = conn
            .zadd(Self::key(queue, to), &job.id, score)
            .await
            .map_err(|e| Error::queue_with_source("state add failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn push(&self, mut record: JobRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let seq: u64 = conn
            .incr("beacon:q:seq", 1)
            .await
            .map_err(|e| Error::queue_with_source("seq increment failed", e))?;
        record.seq = seq;

        if record.run_at_ms > record.created_at_ms {
            record.state = JobState::Delayed;
            self.store(&record).await?;
            let _: () = conn
                .zadd(
                    Self::key(record.queue, "delayed"),
                    &record.id,
                    record.run_at_ms as f64,
                )
                .await
                .map_err(|e| Error::queue_with_source("delayed add failed", e))?;
        } else {
            record.state = JobState::Waiting;
            self.store(&record).await?;
            let _: () = conn
                .zadd(
                    Self::key(record.queue, "waiting"),
                    &record.id,
                    Self::waiting_score(record.priority, record.seq),
                )
                .await
                .map_err(|e| Error::queue_with_source("waiting add failed", e))?;
        }
        Ok(())
    }

    async fn pop(&self, queue: QueueName, now_ms: i64) -> Result<Option<JobRecord>> {
        if self.is_paused(queue).await? {
            return Ok(None);
        }
        self.promote_due(queue, now_ms).await?;

        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmin(Self::key(queue, "waiting"), 1)
            .await
            .map_err(|e| Error::queue_with_source("pop failed", e))?;
        let Some((id, _)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let Some(mut job) = self.load(queue, &id).await? else {
            return Ok(None);
        };
        job.state = JobState::Active;
        job.attempts += 1;
        job.last_heartbeat_ms = now_ms;
        self.store(&job).await?;
        let _: () = conn
            .zadd(Self::key(queue, "active"), &id, now_ms as f64)
            .await
            .map_err(|e| Error::queue_with_source("active add failed", e))?;
        Ok(Some(job))
    }

    async fn heartbeat(&self, queue: QueueName, id: &str, now_ms: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(Self::key(queue, "active"), id, now_ms as f64)
            .await
            .map_err(|e| Error::queue_with_source("heartbeat failed", e))?;
        if let Some(mut job) = self.load(queue, id).await? {
            job.last_heartbeat_ms = now_ms;
            self.store(&job).await?;
        }
        Ok(())
    }

    async fn complete(&self, queue: QueueName, id: &str, now_ms: i64, keep: usize) -> Result<()> {
        let Some(mut job) = self.load(queue, id).await? else {
            return Ok(());
        };
        job.state = JobState::Completed;
        job.finished_at_ms = Some(now_ms);
        self.transition(queue, &job, "active", "completed", now_ms as f64)
            .await?;
        self.trim_terminal(queue, "completed", keep).await?;
        Ok(())
    }

    async fn retry(&self, queue: QueueName, id: &str, run_at_ms: i64, error: &str) -> Result<()> {
        let Some(mut job) = self.load(queue, id).await? else {
            return Ok(());
        };
        job.state = JobState::Delayed;
        job.run_at_ms = run_at_ms;
        job.last_error = Some(error.to_owned());
        self.transition(queue, &job, "active", "delayed", run_at_ms as f64)
            .await
    }

    async fn fail(
        &self,
        queue: QueueName,
        id: &str,
        error: &str,
        now_ms: i64,
        keep: usize,
    ) -> Result<()> {
        let Some(mut job) = self.load(queue, id).await? else {
            return Ok(());
        };
        job.state = JobState::Failed;
        job.last_error = Some(error.to_owned());
        job.finished_at_ms = Some(now_ms);
        self.transition(queue, &job, "active", "failed", now_ms as f64)
            .await?;
        self.trim_terminal(queue, "failed", keep).await?;
        Ok(())
    }

    async fn recover_stalled(
        &self,
        queue: QueueName,
        now_ms: i64,
        stalled_after_ms: i64,
        max_stalled: u32,
        keep_failed: usize,
    ) -> Result<StalledSweep> {
        let mut conn = self.conn.clone();
        let cutoff = (now_ms - stalled_after_ms) as f64;
        let stalled: Vec<String> = conn
            .zrangebyscore(Self::key(queue, "active"), f64::MIN, cutoff)
            .await
            .map_err(|e| Error::queue_with_source("stalled scan failed", e))?;

        let mut sweep = StalledSweep::default();
        for id in stalled {
            let removed: i64 = conn
                .zrem(Self::key(queue, "active"), &id)
                .await
                .map_err(|e| Error::queue_with_source("stalled claim failed", e))?;
            if removed == 0 {
                continue;
            }
            let Some(mut job) = self.load(queue, &id).await? else {
                continue;
            };
            job.stalls += 1;
            if job.stalls > max_stalled {
                job.state = JobState::Failed;
                job.last_error = Some("job stalled".to_owned());
                job.finished_at_ms = Some(now_ms);
                self.store(&job).await?;
                let _: () = conn
                    .zadd(Self::key(queue, "failed"), &id, now_ms as f64)
                    .await
                    .map_err(|e| Error::queue_with_source("stalled fail failed", e))?;
                self.trim_terminal(queue, "failed", keep_failed).await?;
                sweep.failed += 1;
            } else {
                job.state = JobState::Waiting;
                self.store(&job).await?;
                let _: () = conn
                    .zadd(
                        Self::key(queue, "waiting"),
                        &id,
                        Self::waiting_score(job.priority, job.seq),
                    )
                    .await
                    .map_err(|e| Error::queue_with_source("stalled requeue failed", e))?;
                sweep.requeued += 1;
            }
        }
        Ok(sweep)
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts> {
        let conn = self.conn.clone();
        let count = |part: &'static str| {
            let key = Self::key(queue, part);
            let mut conn = conn.clone();
            async move {
                let n: u64 = conn
                    .zcard(key)
                    .await
                    .map_err(|e| Error::queue_with_source("count failed", e))?;
                Ok::<u64, Error>(n)
            }
        };
        Ok(QueueCounts {
            waiting: count("waiting").await?,
            active: count("active").await?,
            completed: count("completed").await?,
            failed: count("failed").await?,
            delayed: count("delayed").await?,
        })
    }

    async fn set_paused(&self, queue: QueueName, paused: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::key(queue, "paused");
        if paused {
            let _: () = conn
                .set(key, 1)
                .await
                .map_err(|e| Error::queue_with_source("pause failed", e))?;
        } else {
            let _: () = conn
                .del(key)
                .await
                .map_err(|e| Error::queue_with_source("resume failed", e))?;
        }
        Ok(())
    }

    async fn is_paused(&self, queue: QueueName) -> Result<bool> {
        let mut conn = self.conn.clone();
        let flag: Option<i64> = conn
            .get(Self::key(queue, "paused"))
            .await
            .map_err(|e| Error::queue_with_source("pause read failed", e))?;
        Ok(flag.is_some())
    }

    async fn clean(
        &self,
        queue: QueueName,
        completed_before_ms: i64,
        failed_before_ms: i64,
    ) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut removed = 0;
        for (set, before) in [("completed", completed_before_ms), ("failed", failed_before_ms)] {
            let set_key = Self::key(queue, set);
            let victims: Vec<String> = conn
                .zrangebyscore(&set_key, f64::MIN, before as f64)
                .await
                .map_err(|e| Error::queue_with_source("clean scan failed", e))?;
            if victims.is_empty() {
                continue;
            }
            let _: () = conn
                .zrem(&set_key, &victims)
                .await
                .map_err(|e| Error::queue_with_source("clean remove failed", e))?;
            let _: () = conn
                .hdel(Self::key(queue, "jobs"), &victims)
                .await
                .map_err(|e| Error::queue_with_source("clean payload drop failed", e))?;
            removed += victims.len() as u64;
        }
        Ok(removed)
    }
}
