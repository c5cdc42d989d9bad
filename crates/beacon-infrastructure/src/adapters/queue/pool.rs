//! Worker Pools
//!
//! One pool per queue: N workers pulling from the shared backend, a
//! heartbeat task per in-flight job, and a janitor recovering stalled jobs.
//! Handler errors and deadline expiries enter the retry pipeline; the final
//! attempt lands the job in `failed`, retained per queue policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use beacon_domain::ports::{ActiveJob, JobHandler, QueueName, QueuePolicy};

use super::backend::{JobRecord, QueueBackend};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A queue's worker pool plus its janitor
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers and one janitor for the queue.
    ///
    /// Workers drain until `shutdown` fires, finishing their in-flight job
    /// first.
    pub fn spawn(
        backend: Arc<dyn QueueBackend>,
        queue: QueueName,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let policy = queue.policy();
        let mut handles = Vec::with_capacity(concurrency + 1);

        for worker_idx in 0..concurrency {
            let backend = Arc::clone(&backend);
            let handler = Arc::clone(&handler);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(
                    backend,
                    queue,
                    handler,
                    policy,
                    poll_interval,
                    worker_idx,
                    shutdown,
                )
                .await;
            }));
        }

        let janitor_backend = Arc::clone(&backend);
        let janitor_shutdown = shutdown;
        handles.push(tokio::spawn(async move {
            janitor_loop(janitor_backend, queue, policy, janitor_shutdown).await;
        }));

        info!(queue = %queue, concurrency, "worker pool started");
        Self { handles }
    }

    /// Wait for every worker to drain
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    backend: Arc<dyn QueueBackend>,
    queue: QueueName,
    handler: Arc<dyn JobHandler>,
    policy: QueuePolicy,
    poll_interval: Duration,
    worker_idx: usize,
    shutdown: CancellationToken,
) {
    debug!(queue = %queue, worker_idx, "worker up");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let job = match backend.pop(queue, now_ms()).await {
            Ok(job) => job,
            Err(e) => {
                warn!(queue = %queue, error = %e, "pop failed");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => continue,
                }
            }
        };
        let Some(record) = job else {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(poll_interval) => {}
            }
            continue;
        };
        process_one(&backend, queue, &handler, policy, record).await;
    }
    debug!(queue = %queue, worker_idx, "worker drained");
}

/// Run one claimed job to a terminal or retry state
async fn process_one(
    backend: &Arc<dyn QueueBackend>,
    queue: QueueName,
    handler: &Arc<dyn JobHandler>,
    policy: QueuePolicy,
    record: JobRecord,
) {
    let job = ActiveJob {
        id: record.id.clone(),
        queue,
        job_type: record.job_type.clone(),
        payload: record.payload.clone(),
        attempt: record.attempts,
        max_attempts: record.max_attempts,
    };

    // heartbeat while the handler runs, at a third of the stall window
    let hb_backend = Arc::clone(backend);
    let hb_id = record.id.clone();
    let hb_interval = policy.stalled_after / 3;
    let heartbeat = tokio::spawn(async move {
        loop {
            tokio::time::sleep(hb_interval).await;
            if let Err(e) = hb_backend.heartbeat(queue, &hb_id, now_ms()).await {
                debug!(queue = %queue, job_id = %hb_id, error = %e, "heartbeat failed");
            }
        }
    });

    let outcome = tokio::time::timeout(policy.job_timeout, handler.handle(&job)).await;
    heartbeat.abort();

    match outcome {
        Ok(Ok(())) => {
            if let Err(e) = backend
                .complete(queue, &record.id, now_ms(), policy.retention_completed)
                .await
            {
                warn!(queue = %queue, job_id = %record.id, error = %e, "complete failed");
            }
            debug!(queue = %queue, job_id = %record.id, attempt = record.attempts, "job completed");
        }
        Ok(Err(handler_err)) => {
            // malformed payloads and other permanent conditions skip the
            // retry pipeline entirely
            let retryable = handler_err.is_retryable();
            retry_or_fail(
                backend,
                queue,
                policy,
                &record,
                &handler_err.to_string(),
                retryable,
            )
            .await;
        }
        Err(_elapsed) => {
            let message = format!("deadline of {:?} expired", policy.job_timeout);
            retry_or_fail(backend, queue, policy, &record, &message, true).await;
        }
    }
}

async fn retry_or_fail(
    backend: &Arc<dyn QueueBackend>,
    queue: QueueName,
    policy: QueuePolicy,
    record: &JobRecord,
    message: &str,
    retryable: bool,
) {
    if retryable && record.attempts < record.max_attempts {
        let delay = policy.retry_delay(record.attempts);
        let run_at = now_ms() + delay.as_millis() as i64;
        warn!(
            queue = %queue,
            job_id = %record.id,
            attempt = record.attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = message,
            "job failed, retrying"
        );
        if let Err(e) = backend.retry(queue, &record.id, run_at, message).await {
            warn!(queue = %queue, job_id = %record.id, error = %e, "retry scheduling failed");
        }
    } else {
        error!(
            queue = %queue,
            job_id = %record.id,
            attempts = record.attempts,
            error = message,
            "job exhausted its attempts"
        );
        if let Err(e) = backend
            .fail(queue, &record.id, message, now_ms(), policy.retention_failed)
            .await
        {
            warn!(queue = %queue, job_id = %record.id, error = %e, "fail transition failed");
        }
    }
}

async fn janitor_loop(
    backend: Arc<dyn QueueBackend>,
    queue: QueueName,
    policy: QueuePolicy,
    shutdown: CancellationToken,
) {
    let interval = policy.stalled_after / 2;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
        match backend
            .recover_stalled(
                queue,
                now_ms(),
                policy.stalled_after.as_millis() as i64,
                policy.max_stalled,
                policy.retention_failed,
            )
            .await
        {
            Ok(sweep) if sweep.requeued > 0 || sweep.failed > 0 => {
                warn!(
                    queue = %queue,
                    requeued = sweep.requeued,
                    failed = sweep.failed,
                    "stalled jobs recovered"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(queue = %queue, error = %e, "stalled sweep failed"),
        }
    }
}
