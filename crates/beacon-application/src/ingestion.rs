//! Ingestion Use Case
//!
//! # Overview
//! Synchronous intake of error reports from browser SDKs. Each accepted
//! report is fingerprinted, persisted to the relational store (authoritative)
//! and mirrored to the columnar store (best-effort), then fanned out to the
//! downstream queues.
//!
//! # Failure policy
//! - relational insert failure fails the call
//! - columnar mirror failure is logged and swallowed
//! - a queue `add` failure is logged and reported per row in batch mode
//!
//! Sampling happens before persistence: a report is dropped with probability
//! `1 - error_sampling_rate` of its project.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use beacon_domain::entities::{ErrorType, NewErrorLog};
use beacon_domain::error::{Error, Result};
use beacon_domain::fingerprint::fingerprint;
use beacon_domain::ports::{
    ErrorLogRepository, JobOptions, LogStore, ProjectRepository, QueueFabric, QueueName,
};

/// Hard cap on rows per batch call
pub const MAX_BATCH_SIZE: usize = 500;

/// One error report as received on the wire
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Owning project
    #[validate(length(min = 1, max = 64))]
    pub project_id: String,
    /// Category of the occurrence
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Raw error message
    #[validate(length(min = 1))]
    pub error_message: String,
    /// Raw stack trace text
    #[serde(default)]
    pub error_stack: Option<String>,
    /// Page URL at the time of the error
    #[serde(default)]
    pub page_url: Option<String>,
    /// End-user identifier
    #[serde(default)]
    pub user_id: Option<String>,
    /// Browser user agent
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Opaque device description
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
    /// Opaque network description
    #[serde(default)]
    pub network_info: Option<serde_json::Value>,
    /// Opaque performance payload
    #[serde(default)]
    pub performance_data: Option<serde_json::Value>,
    /// Minified source file of the top frame
    #[serde(default)]
    pub source_file: Option<String>,
    /// Minified line (base-1)
    #[serde(default)]
    pub source_line: Option<u32>,
    /// Minified column (base-1)
    #[serde(default)]
    pub source_column: Option<u32>,
    /// Project release version
    #[serde(default)]
    pub project_version: Option<String>,
    /// Build identifier
    #[serde(default)]
    pub build_id: Option<String>,
    /// Severity 1..4; defaults to 2
    #[serde(default)]
    #[validate(range(min = 1, max = 4))]
    pub error_level: Option<u8>,
}

/// Per-row outcome of a batch call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRowOutcome {
    /// Assigned log id
    pub id: i64,
    /// Whether downstream fan-out succeeded
    pub enqueued: bool,
    /// Failure description when fan-out broke
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Synchronous intake service (C8)
pub struct IngestionService {
    error_logs: Arc<dyn ErrorLogRepository>,
    log_store: Arc<dyn LogStore>,
    queues: Arc<dyn QueueFabric>,
    projects: Arc<dyn ProjectRepository>,
}

impl IngestionService {
    /// Create the service with injected store and queue handles
    pub fn new(
        error_logs: Arc<dyn ErrorLogRepository>,
        log_store: Arc<dyn LogStore>,
        queues: Arc<dyn QueueFabric>,
        projects: Arc<dyn ProjectRepository>,
    ) -> Self {
        Self {
            error_logs,
            log_store,
            queues,
            projects,
        }
    }

    /// Accept one report. Returns `Ok(None)` when sampling dropped it.
    ///
    /// # Errors
    ///
    /// Returns an error when validation or the relational insert fails.
    pub async fn report_one(&self, report: ErrorReport) -> Result<Option<i64>> {
        validate_report(&report)?;
        if !self.sample_keep(&report.project_id).await? {
            debug!(project_id = %report.project_id, "report dropped by sampling");
            return Ok(None);
        }

        let log = self.enrich(report);
        let id = self.error_logs.insert(&log).await?;
        self.mirror_to_columnar(id, &log).await;
        if let Err(e) = self.fan_out(id, &log).await {
            warn!(error_id = id, error = %e, "downstream enqueue failed");
            return Err(Error::internal(format!(
                "report {id} persisted but enqueue failed"
            )));
        }
        Ok(Some(id))
    }

    /// Accept a batch of up to [`MAX_BATCH_SIZE`] reports atomically.
    ///
    /// Persistence is all-or-nothing; fan-out failures are reported per row.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` on an empty or oversized batch and `Database`
    /// when the transactional insert fails.
    pub async fn report_batch(&self, reports: Vec<ErrorReport>) -> Result<Vec<BatchRowOutcome>> {
        if reports.is_empty() {
            return Err(Error::bad_request("batch must contain at least one report"));
        }
        if reports.len() > MAX_BATCH_SIZE {
            return Err(Error::bad_request(format!(
                "batch of {} exceeds the maximum of {MAX_BATCH_SIZE}",
                reports.len()
            )));
        }
        for report in &reports {
            validate_report(report)?;
        }

        let mut kept = Vec::with_capacity(reports.len());
        for report in reports {
            if self.sample_keep(&report.project_id).await? {
                kept.push(self.enrich(report));
            }
        }
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.error_logs.insert_batch(&kept).await?;
        let rows: Vec<(i64, NewErrorLog)> = ids.iter().copied().zip(kept.iter().cloned()).collect();
        if let Err(e) = self.log_store.insert_batch(&rows).await {
            warn!(rows = rows.len(), error = %e, "columnar mirror failed for batch");
        }

        let mut outcomes = Vec::with_capacity(rows.len());
        for (id, log) in &rows {
            match self.fan_out(*id, log).await {
                Ok(()) => outcomes.push(BatchRowOutcome {
                    id: *id,
                    enqueued: true,
                    error: None,
                }),
                Err(e) => {
                    warn!(error_id = id, error = %e, "downstream enqueue failed");
                    outcomes.push(BatchRowOutcome {
                        id: *id,
                        enqueued: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    /// Sampling decision for one project; unknown projects are kept so a
    /// misconfigured key loses nothing
    async fn sample_keep(&self, project_id: &str) -> Result<bool> {
        let rate = self
            .projects
            .find_by_id(project_id)
            .await?
            .map_or(1.0, |p| p.error_sampling_rate);
        if rate >= 1.0 {
            return Ok(true);
        }
        Ok(rand::random::<f64>() < rate)
    }

    /// Fingerprint and timestamp a wire report
    fn enrich(&self, report: ErrorReport) -> NewErrorLog {
        let error_hash = fingerprint(
            report.error_stack.as_deref().unwrap_or(""),
            &report.error_message,
            report.source_file.as_deref().unwrap_or(""),
        );
        NewErrorLog {
            project_id: report.project_id,
            error_type: report.error_type,
            error_hash,
            error_message: report.error_message,
            error_stack: report.error_stack,
            page_url: report.page_url,
            user_id: report.user_id,
            user_agent: report.user_agent,
            device_info: report.device_info,
            network_info: report.network_info,
            performance_data: report.performance_data,
            source_file: report.source_file,
            source_line: report.source_line,
            source_column: report.source_column,
            project_version: report.project_version,
            build_id: report.build_id,
            error_level: report.error_level.unwrap_or(2),
            created_at: Utc::now(),
        }
    }

    /// Columnar mirror is fire-and-forget-logged, never fatal
    async fn mirror_to_columnar(&self, id: i64, log: &NewErrorLog) {
        if let Err(e) = self.log_store.insert(id, log).await {
            warn!(error_id = id, error = %e, "columnar mirror failed");
        }
    }

    /// Enqueue the downstream jobs for one saved row
    async fn fan_out(&self, id: i64, log: &NewErrorLog) -> Result<()> {
        self.queues
            .add(
                QueueName::ErrorProcessing,
                "process-error",
                serde_json::json!({ "errorId": id, "projectId": log.project_id }),
                JobOptions::default(),
            )
            .await?;

        if log.source_file.is_none() && log.error_stack.is_some() {
            self.queues
                .add(
                    QueueName::SourcemapProcessing,
                    "resolve-error",
                    serde_json::json!({ "errorId": id }),
                    JobOptions::default(),
                )
                .await?;
        }

        self.queues
            .add(
                QueueName::ErrorAggregation,
                "aggregate-project",
                serde_json::json!({ "projectId": log.project_id }),
                JobOptions::default(),
            )
            .await?;
        Ok(())
    }
}

fn validate_report(report: &ErrorReport) -> Result<()> {
    if report.project_id.trim().is_empty() {
        return Err(Error::bad_request("projectId is required"));
    }
    report
        .validate()
        .map_err(|e| Error::bad_request(format!("invalid report: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_validation_catches_missing_fields() {
        let report = ErrorReport {
            project_id: " ".to_owned(),
            error_type: ErrorType::JsError,
            error_message: "boom".to_owned(),
            error_stack: None,
            page_url: None,
            user_id: None,
            user_agent: None,
            device_info: None,
            network_info: None,
            performance_data: None,
            source_file: None,
            source_line: None,
            source_column: None,
            project_version: None,
            build_id: None,
            error_level: None,
        };
        assert!(validate_report(&report).is_err());

        let report = ErrorReport {
            project_id: "p1".to_owned(),
            error_level: Some(9),
            ..report
        };
        assert!(validate_report(&report).is_err());

        let report = ErrorReport {
            error_level: Some(4),
            ..report
        };
        assert!(validate_report(&report).is_ok());
    }
}
