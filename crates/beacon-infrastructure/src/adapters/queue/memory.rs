//! In-memory queue backend
//!
//! Single-process implementation used by tests and standalone runs. One
//! mutex around the whole store keeps claim semantics trivially correct;
//! throughput is not the point here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{JobState, QueueCounts, QueueName};

use super::backend::{JobRecord, QueueBackend, StalledSweep};

#[derive(Default)]
struct QueueState {
    waiting: Vec<JobRecord>,
    delayed: Vec<JobRecord>,
    active: Vec<JobRecord>,
    completed: Vec<JobRecord>,
    failed: Vec<JobRecord>,
    paused: bool,
}

/// Mutex-guarded multi-queue store
#[derive(Default)]
pub struct MemoryQueueBackend {
    queues: Mutex<HashMap<QueueName, QueueState>>,
    seq: AtomicU64,
}

impl MemoryQueueBackend {
    /// Empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn with_queue<T>(&self, queue: QueueName, f: impl FnOnce(&mut QueueState) -> T) -> Result<T> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| Error::queue("memory backend mutex poisoned"))?;
        Ok(f(queues.entry(queue).or_default()))
    }
}

fn take_job(pool: &mut Vec<JobRecord>, id: &str) -> Option<JobRecord> {
    let idx = pool.iter().position(|j| j.id == id)?;
    Some(pool.remove(idx))
}

fn trim_terminal(pool: &mut Vec<JobRecord>, keep: usize) {
    if pool.len() > keep {
        let drop = pool.len() - keep;
        pool.drain(..drop);
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn push(&self, mut record: JobRecord) -> Result<()> {
        record.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.with_queue(record.queue, |state| {
            if record.run_at_ms > record.created_at_ms {
                record.state = JobState::Delayed;
                state.delayed.push(record);
            } else {
                record.state = JobState::Waiting;
                state.waiting.push(record);
            }
        })
    }

    async fn pop(&self, queue: QueueName, now_ms: i64) -> Result<Option<JobRecord>> {
        self.with_queue(queue, |state| {
            // promote due delayed jobs first
            let due: Vec<usize> = state
                .delayed
                .iter()
                .enumerate()
                .filter(|(_, j)| j.run_at_ms <= now_ms)
                .map(|(i, _)| i)
                .collect();
            for idx in due.into_iter().rev() {
                let mut job = state.delayed.remove(idx);
                job.state = JobState::Waiting;
                state.waiting.push(job);
            }

            if state.paused || state.waiting.is_empty() {
                return None;
            }

            // highest priority first, FIFO (enqueue seq) on ties
            let best = state
                .waiting
                .iter()
                .enumerate()
                .min_by_key(|(_, j)| (std::cmp::Reverse(j.priority), j.seq))
                .map(|(i, _)| i)?;
            let mut job = state.waiting.remove(best);
            job.state = JobState::Active;
            job.attempts += 1;
            job.last_heartbeat_ms = now_ms;
            state.active.push(job.clone());
            Some(job)
        })
    }

    async fn heartbeat(&self, queue: QueueName, id: &str, now_ms: i64) -> Result<()> {
        self.with_queue(queue, |state| {
            if let Some(job) = state.active.iter_mut().find(|j| j.id == id) {
                job.last_heartbeat_ms = now_ms;
            }
        })
    }

    async fn complete(&self, queue: QueueName, id: &str, now_ms: i64, keep: usize) -> Result<()> {
        self.with_queue(queue, |state| {
            if let Some(mut job) = take_job(&mut state.active, id) {
                job.state = JobState::Completed;
                job.finished_at_ms = Some(now_ms);
                state.completed.push(job);
                trim_terminal(&mut state.completed, keep);
            }
        })
    }

    async fn retry(&self, queue: QueueName, id: &str, run_at_ms: i64, error: &str) -> Result<()> {
        self.with_queue(queue, |state| {
            if let Some(mut job) = take_job(&mut state.active, id) {
                job.state = JobState::Delayed;
                job.run_at_ms = run_at_ms;
                job.last_error = Some(error.to_owned());
                state.delayed.push(job);
            }
        })
    }

    async fn fail(
        &self,
        queue: QueueName,
        id: &str,
        error: &str,
        now_ms: i64,
        keep: usize,
    ) -> Result<()> {
        self.with_queue(queue, |state| {
            if let Some(mut job) = take_job(&mut state.active, id) {
                job.state = JobState::Failed;
                job.last_error = Some(error.to_owned());
                job.finished_at_ms = Some(now_ms);
                state.failed.push(job);
                trim_terminal(&mut state.failed, keep);
            }
        })
    }

    async fn recover_stalled(
        &self,
        queue: QueueName,
        now_ms: i64,
        stalled_after_ms: i64,
        max_stalled: u32,
        keep_failed: usize,
    ) -> Result<StalledSweep> {
        self.with_queue(queue, |state| {
            let cutoff = now_ms - stalled_after_ms;
            let stalled: Vec<String> = state
                .active
                .iter()
                .filter(|j| j.last_heartbeat_ms < cutoff)
                .map(|j| j.id.clone())
                .collect();

            let mut sweep = StalledSweep::default();
            for id in stalled {
                let Some(mut job) = take_job(&mut state.active, &id) else {
                    continue;
                };
                job.stalls += 1;
                if job.stalls > max_stalled {
                    job.state = JobState::Failed;
                    job.last_error = Some("job stalled".to_owned());
                    job.finished_at_ms = Some(now_ms);
                    state.failed.push(job);
                    trim_terminal(&mut state.failed, keep_failed);
                    sweep.failed += 1;
                } else {
                    job.state = JobState::Waiting;
                    state.waiting.push(job);
                    sweep.requeued += 1;
                }
            }
            sweep
        })
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts> {
        self.with_queue(queue, |state| QueueCounts {
            waiting: state.waiting.len() as u64,
            active: state.active.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
            delayed: state.delayed.len() as u64,
        })
    }

    async fn set_paused(&self, queue: QueueName, paused: bool) -> Result<()> {
        self.with_queue(queue, |state| {
            state.paused = paused;
        })
    }

    async fn is_paused(&self, queue: QueueName) -> Result<bool> {
        self.with_queue(queue, |state| state.paused)
    }

    async fn clean(
        &self,
        queue: QueueName,
        completed_before_ms: i64,
        failed_before_ms: i64,
    ) -> Result<u64> {
        self.with_queue(queue, |state| {
            let before = (state.completed.len() + state.failed.len()) as u64;
            state
                .completed
                .retain(|j| j.finished_at_ms.is_none_or(|t| t >= completed_before_ms));
            state
                .failed
                .retain(|j| j.finished_at_ms.is_none_or(|t| t >= failed_before_ms));
            before - (state.completed.len() + state.failed.len()) as u64
        })
    }
}
