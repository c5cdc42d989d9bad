//! Post-Intake Processing Worker
//!
//! Worker on the `error-processing` queue: per-row bookkeeping that should
//! not sit on the synchronous intake path. Today that is severity triage —
//! severe errors whose aggregation has no diagnosis yet get an AI diagnosis
//! job enqueued.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ActiveJob, AggregationRepository, ErrorAnalyzer, ErrorLogRepository, JobHandler, JobOptions,
    QueueFabric, QueueName, priority,
};

/// Severity at which an undiagnosed error triggers automatic diagnosis
const AUTO_DIAGNOSE_LEVEL: u8 = 3;

/// Per-row post-intake worker
pub struct ProcessingWorker {
    error_logs: Arc<dyn ErrorLogRepository>,
    aggregations: Arc<dyn AggregationRepository>,
    queues: Arc<dyn QueueFabric>,
    analyzer: Arc<dyn ErrorAnalyzer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingPayload {
    error_id: i64,
}

impl ProcessingWorker {
    /// Create the worker with injected handles
    pub fn new(
        error_logs: Arc<dyn ErrorLogRepository>,
        aggregations: Arc<dyn AggregationRepository>,
        queues: Arc<dyn QueueFabric>,
        analyzer: Arc<dyn ErrorAnalyzer>,
    ) -> Self {
        Self {
            error_logs,
            aggregations,
            queues,
            analyzer,
        }
    }

    /// Process one stored row
    ///
    /// # Errors
    ///
    /// Returns an error when a store or queue operation fails; a vanished
    /// row is a successful no-op.
    pub async fn run(&self, error_id: i64) -> Result<()> {
        let Some(log) = self.error_logs.find_by_id(error_id).await? else {
            debug!(error_id, "log vanished before processing");
            return Ok(());
        };

        if !self.analyzer.is_enabled() || log.error_level < AUTO_DIAGNOSE_LEVEL {
            return Ok(());
        }

        let Some(aggregation) = self
            .aggregations
            .find_by_hash(&log.project_id, &log.error_hash)
            .await?
        else {
            // aggregation engine has not rolled this hash up yet; the next
            // severe occurrence retries
            return Ok(());
        };
        if aggregation.ai_diagnosis.is_some() {
            return Ok(());
        }

        self.queues
            .add(
                QueueName::AiDiagnosis,
                "analyze-error",
                serde_json::json!({ "aggregationId": aggregation.id }),
                JobOptions::with_priority(priority::HIGH),
            )
            .await?;
        debug!(
            error_id,
            aggregation_id = aggregation.id,
            "severe error queued for diagnosis"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ProcessingWorker {
    async fn handle(&self, job: &ActiveJob) -> Result<()> {
        let payload: ProcessingPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::bad_request(format!("malformed processing payload: {e}")))?;
        self.run(payload.error_id).await
    }
}
