//! Aggregation Engine Use Case
//!
//! # Overview
//! Worker on the `error-aggregation` queue. Reads a bounded batch of
//! unaggregated error logs for one project, groups them by fingerprint,
//! merges each group into its `ErrorAggregation` row, marks the logs
//! processed, and enqueues an alert email when a group's occurrence count
//! crosses the project's alert threshold.
//!
//! Re-running over the same set is harmless: the processed flag keeps
//! counted rows out of the next read, and the upsert is atomic per
//! `(project, hash)` against concurrent workers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use beacon_domain::entities::{AggregationUpsert, ErrorLog};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ActiveJob, AggregationRepository, AlertEmail, ErrorLogRepository, JobHandler, JobOptions,
    ProjectRepository, QueueFabric, QueueName, priority,
};

/// Max unprocessed logs consumed per run
pub const AGGREGATION_BATCH_LIMIT: u32 = 1000;

/// Fingerprint rollup engine (C9)
pub struct AggregationEngine {
    error_logs: Arc<dyn ErrorLogRepository>,
    aggregations: Arc<dyn AggregationRepository>,
    projects: Arc<dyn ProjectRepository>,
    queues: Arc<dyn QueueFabric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationPayload {
    project_id: String,
}

impl AggregationEngine {
    /// Create the engine with injected handles
    pub fn new(
        error_logs: Arc<dyn ErrorLogRepository>,
        aggregations: Arc<dyn AggregationRepository>,
        projects: Arc<dyn ProjectRepository>,
        queues: Arc<dyn QueueFabric>,
    ) -> Self {
        Self {
            error_logs,
            aggregations,
            projects,
            queues,
        }
    }

    /// Aggregate one project's pending logs; returns groups merged
    ///
    /// # Errors
    ///
    /// Returns an error when a store operation fails; the fabric will retry
    /// the job and the processed flag keeps the math idempotent.
    pub async fn run(&self, project_id: &str) -> Result<usize> {
        let logs = self
            .error_logs
            .find_unprocessed(project_id, AGGREGATION_BATCH_LIMIT)
            .await?;
        if logs.is_empty() {
            debug!(project_id, "nothing to aggregate");
            return Ok(0);
        }

        let threshold = self
            .projects
            .find_by_id(project_id)
            .await?
            .map(|p| p.alert_threshold);

        let groups = group_by_hash(&logs);
        let group_count = groups.len();
        let mut processed_ids: Vec<i64> = Vec::with_capacity(logs.len());

        for (hash, group) in groups {
            let upsert = build_upsert(project_id, &hash, &group);
            let outcome = self.aggregations.upsert(&upsert).await?;
            processed_ids.extend(group.iter().map(|l| l.id));

            if let Some(threshold) = threshold {
                if outcome.previous_count < threshold && outcome.occurrence_count >= threshold {
                    self.enqueue_alert(project_id, &hash, &group, outcome.occurrence_count, threshold)
                        .await;
                }
            }
        }

        self.error_logs.mark_processed(&processed_ids).await?;
        info!(
            project_id,
            logs = processed_ids.len(),
            groups = group_count,
            "aggregation run complete"
        );
        Ok(group_count)
    }

    /// Alert enqueue is best-effort: a queue hiccup must not fail the run
    /// after counters are already merged
    async fn enqueue_alert(
        &self,
        project_id: &str,
        hash: &str,
        group: &[&ErrorLog],
        occurrence_count: u64,
        threshold: u64,
    ) {
        let alert = AlertEmail {
            project_id: project_id.to_owned(),
            error_hash: hash.to_owned(),
            error_message: group
                .last()
                .map(|l| l.error_message.clone())
                .unwrap_or_default(),
            occurrence_count,
            threshold,
        };
        let payload = match serde_json::to_value(&alert) {
            Ok(v) => v,
            Err(e) => {
                warn!(project_id, error_hash = hash, error = %e, "alert payload serialization failed");
                return;
            }
        };
        if let Err(e) = self
            .queues
            .add(
                QueueName::EmailNotification,
                "send-alert-email",
                payload,
                JobOptions::with_priority(priority::HIGH),
            )
            .await
        {
            warn!(project_id, error_hash = hash, error = %e, "alert enqueue failed");
        }
    }
}

/// Group logs by fingerprint, preserving encounter order inside a group
fn group_by_hash(logs: &[ErrorLog]) -> HashMap<String, Vec<&ErrorLog>> {
    let mut groups: HashMap<String, Vec<&ErrorLog>> = HashMap::new();
    for log in logs {
        groups.entry(log.error_hash.clone()).or_default().push(log);
    }
    groups
}

/// Merge payload for one group; the newest log is the representative
fn build_upsert(project_id: &str, hash: &str, group: &[&ErrorLog]) -> AggregationUpsert {
    let newest = group
        .iter()
        .max_by_key(|l| l.created_at)
        .copied()
        .unwrap_or(group[0]);
    let mut user_ids: Vec<String> = group
        .iter()
        .filter_map(|l| l.user_id.clone())
        .collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    AggregationUpsert {
        project_id: project_id.to_owned(),
        error_hash: hash.to_owned(),
        error_type: newest.error_type,
        error_message: newest.error_message.clone(),
        error_stack: newest.error_stack.clone(),
        source_file: newest.source_file.clone(),
        source_line: newest.source_line,
        source_column: newest.source_column,
        batch_count: group.len() as u64,
        user_ids,
        error_level: group.iter().map(|l| l.error_level).max().unwrap_or(1),
        newest_seen: newest.created_at,
    }
}

#[async_trait]
impl JobHandler for AggregationEngine {
    async fn handle(&self, job: &ActiveJob) -> Result<()> {
        let payload: AggregationPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::bad_request(format!("malformed aggregation payload: {e}")))?;
        self.run(&payload.project_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_domain::entities::ErrorType;
    use chrono::{Duration, Utc};

    fn log(id: i64, hash: &str, user: Option<&str>, level: u8, age_secs: i64) -> ErrorLog {
        ErrorLog {
            id,
            project_id: "p1".to_owned(),
            error_type: ErrorType::JsError,
            error_hash: hash.to_owned(),
            error_message: format!("message {id}"),
            error_stack: None,
            page_url: None,
            user_id: user.map(str::to_owned),
            user_agent: None,
            device_info: None,
            network_info: None,
            performance_data: None,
            source_file: None,
            source_line: None,
            source_column: None,
            project_version: None,
            build_id: None,
            original_source: None,
            original_line: None,
            original_column: None,
            function_name: None,
            source_snippet: None,
            is_source_resolved: false,
            ai_diagnosis: None,
            comprehensive_analysis_report: None,
            comprehensive_analysis_generated_at: None,
            error_level: level,
            is_processed: false,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn grouping_splits_by_hash() {
        let logs = vec![
            log(1, "a", Some("u1"), 2, 30),
            log(2, "b", Some("u1"), 2, 20),
            log(3, "a", Some("u2"), 3, 10),
        ];
        let groups = group_by_hash(&logs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a"].len(), 2);
    }

    #[test]
    fn upsert_takes_newest_representative_and_max_level() {
        let logs = vec![
            log(1, "a", Some("u1"), 4, 30),
            log(3, "a", Some("u2"), 2, 10),
        ];
        let group: Vec<&ErrorLog> = logs.iter().collect();
        let upsert = build_upsert("p1", "a", &group);
        assert_eq!(upsert.error_message, "message 3");
        assert_eq!(upsert.error_level, 4);
        assert_eq!(upsert.batch_count, 2);
        assert_eq!(upsert.user_ids.len(), 2);
    }

    #[test]
    fn duplicate_users_count_once_per_batch() {
        let logs = vec![
            log(1, "a", Some("u1"), 2, 30),
            log(2, "a", Some("u1"), 2, 20),
            log(3, "a", None, 2, 10),
        ];
        let group: Vec<&ErrorLog> = logs.iter().collect();
        let upsert = build_upsert("p1", "a", &group);
        assert_eq!(upsert.user_ids, vec!["u1".to_owned()]);
        assert_eq!(upsert.batch_count, 3);
    }
}
