//! AI Diagnosis Orchestrator
//!
//! # Overview
//! Worker on the `ai-diagnosis` queue. Assembles one unified prompt from
//! the aggregation, the sourcemap mapping, and the archived source snippet,
//! calls the external analyzer exactly once, and persists the structured
//! report, recording each generated diagnosis on the bounded history ring.
//!
//! # Concurrency
//! Diagnosis is serialized per aggregation by an in-process advisory lock
//! with a 30 s acquisition timeout; a timeout re-raises as retryable so the
//! fabric re-queues the job. Analyzer failures never touch the row: the
//! prior diagnosis survives every failed attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use beacon_domain::entities::ErrorAggregation;
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ActiveJob, AggregationRepository, ArchiveStore, ErrorAnalyzer, ErrorLogRepository, JobHandler,
    LocatedSource, ResolvedFrame, SourceCodeRepository, SourcemapResolver,
};
use beacon_domain::stack::parse_stack;

use crate::prompt::{DIAGNOSIS_SYSTEM_PROMPT, PromptContext, build_prompt};
use crate::report::{parse_report, stored};

/// How long a worker waits for the per-aggregation lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Context lines requested around the failing line
const SNIPPET_CONTEXT_LINES: u32 = 5;

/// What a diagnosis run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisOutcome {
    /// Report generated and persisted
    Completed,
    /// Row already diagnosed and `force` was not set
    Skipped,
    /// Diagnosis disabled by configuration
    Disabled,
}

/// Diagnosis orchestration service (C10)
pub struct DiagnosisService {
    aggregations: Arc<dyn AggregationRepository>,
    error_logs: Arc<dyn ErrorLogRepository>,
    archive: Arc<dyn ArchiveStore>,
    resolver: Arc<dyn SourcemapResolver>,
    source_code: Arc<dyn SourceCodeRepository>,
    analyzer: Arc<dyn ErrorAnalyzer>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosisPayload {
    #[serde(default)]
    aggregation_id: Option<i64>,
    #[serde(default)]
    error_id: Option<i64>,
    #[serde(default)]
    force: bool,
}

impl DiagnosisService {
    /// Create the orchestrator with injected handles
    pub fn new(
        aggregations: Arc<dyn AggregationRepository>,
        error_logs: Arc<dyn ErrorLogRepository>,
        archive: Arc<dyn ArchiveStore>,
        resolver: Arc<dyn SourcemapResolver>,
        source_code: Arc<dyn SourceCodeRepository>,
        analyzer: Arc<dyn ErrorAnalyzer>,
    ) -> Self {
        Self {
            aggregations,
            error_logs,
            archive,
            resolver,
            source_code,
            analyzer,
            locks: DashMap::new(),
        }
    }

    /// Diagnose one aggregation.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the per-aggregation lock cannot be acquired
    /// (retryable), `NotFound` for a vanished row, and the analyzer/store
    /// errors otherwise. The aggregation row is never left half-written.
    pub async fn analyze_aggregation(
        &self,
        aggregation_id: i64,
        force: bool,
    ) -> Result<DiagnosisOutcome> {
        if !self.analyzer.is_enabled() {
            debug!(aggregation_id, "diagnosis disabled by configuration");
            return Ok(DiagnosisOutcome::Disabled);
        }

        let lock = self
            .locks
            .entry(aggregation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(_guard) = tokio::time::timeout(LOCK_TIMEOUT, lock.lock()).await else {
            return Err(Error::timeout(format!(
                "diagnosis lock for aggregation {aggregation_id}"
            )));
        };

        let aggregation = self
            .aggregations
            .find_by_id(aggregation_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("aggregation {aggregation_id}")))?;

        if aggregation.ai_diagnosis.is_some() && !force {
            debug!(aggregation_id, "already diagnosed, skipping");
            return Ok(DiagnosisOutcome::Skipped);
        }

        self.run_analysis(aggregation).await?;
        Ok(DiagnosisOutcome::Completed)
    }

    /// Diagnose by error-log id: routes to the log's aggregation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the log or its aggregation does not exist.
    pub async fn analyze_error(&self, error_id: i64, force: bool) -> Result<DiagnosisOutcome> {
        let log = self
            .error_logs
            .find_by_id(error_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("error log {error_id}")))?;
        let aggregation = self
            .aggregations
            .find_by_hash(&log.project_id, &log.error_hash)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("aggregation for error {error_id} not built yet"))
            })?;
        self.analyze_aggregation(aggregation.id, force).await
    }

    async fn run_analysis(&self, mut aggregation: ErrorAggregation) -> Result<()> {
        let version = self
            .source_code
            .find_active_version(&aggregation.project_id)
            .await
            .ok()
            .flatten()
            .map(|v| v.version);

        let mapping = self.resolve_top_frame(&aggregation, version.as_deref()).await;
        let source = self.locate_source(&aggregation, version.as_deref(), mapping.as_ref()).await;

        let user_prompt = build_prompt(&PromptContext {
            aggregation: Some(&aggregation),
            source: source.as_ref(),
            mapping: mapping.as_ref(),
            version: version.as_deref(),
        });
        let prompt = format!("{DIAGNOSIS_SYSTEM_PROMPT}\n\n{user_prompt}");

        // the single analyzer call of this attempt
        let raw = self.analyzer.analyze(&prompt).await?;
        let generated_at = Utc::now();
        let report = parse_report(&raw);
        let report_json = serde_json::to_value(stored(report.clone(), generated_at))?;

        let diagnosis = if report.summary.is_empty() {
            report.root_cause.clone()
        } else {
            report.summary.clone()
        };
        let fix = report.fix_suggestions.first().map(|f| f.suggestion.clone());

        // the ring records every generated diagnosis, newest last
        aggregation.push_diagnosis_history(beacon_domain::entities::DiagnosisHistoryEntry {
            timestamp: generated_at,
            analysis: diagnosis.clone(),
            fix_suggestion: fix.clone(),
        });
        self.aggregations
            .record_diagnosis(
                aggregation.id,
                &diagnosis,
                fix.as_deref(),
                &aggregation.ai_diagnosis_history,
                &report_json,
            )
            .await?;

        // best-effort mirror; the aggregation row is the source of truth
        if let Err(e) = self
            .error_logs
            .mirror_diagnosis(
                &aggregation.project_id,
                &aggregation.error_hash,
                &diagnosis,
                &report_json,
                generated_at,
            )
            .await
        {
            warn!(
                aggregation_id = aggregation.id,
                error = %e,
                "diagnosis mirror to error logs failed"
            );
        }

        info!(
            aggregation_id = aggregation.id,
            project_id = %aggregation.project_id,
            "diagnosis persisted"
        );
        Ok(())
    }

    /// Resolve the top stack frame; failures degrade to no mapping
    async fn resolve_top_frame(
        &self,
        aggregation: &ErrorAggregation,
        version: Option<&str>,
    ) -> Option<ResolvedFrame> {
        let stack = aggregation.error_stack.as_deref()?;
        let frame = parse_stack(stack).into_iter().next()?;
        let version = version?;
        match self
            .resolver
            .resolve_one(&aggregation.project_id, version, &frame)
            .await
        {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                debug!(aggregation_id = aggregation.id, error = %e, "frame resolution failed");
                None
            }
        }
    }

    /// Pull the snippet around the best-known location; failures degrade to
    /// no snippet
    async fn locate_source(
        &self,
        aggregation: &ErrorAggregation,
        version: Option<&str>,
        mapping: Option<&ResolvedFrame>,
    ) -> Option<LocatedSource> {
        let (path, line) = match mapping.and_then(|m| m.original.as_ref()) {
            Some(original) => (original.source.clone(), Some(original.line)),
            None => (aggregation.source_file.clone()?, aggregation.source_line),
        };
        match self
            .archive
            .by_location(
                &aggregation.project_id,
                version,
                &path,
                line,
                SNIPPET_CONTEXT_LINES,
            )
            .await
        {
            Ok(located) => Some(located),
            Err(e) => {
                debug!(aggregation_id = aggregation.id, error = %e, "source lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler for DiagnosisService {
    async fn handle(&self, job: &ActiveJob) -> Result<()> {
        let payload: DiagnosisPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::bad_request(format!("malformed diagnosis payload: {e}")))?;
        match (payload.aggregation_id, payload.error_id) {
            (Some(id), _) => {
                self.analyze_aggregation(id, payload.force).await?;
            }
            (None, Some(error_id)) => {
                self.analyze_error(error_id, payload.force).await?;
            }
            (None, None) => {
                return Err(Error::bad_request(
                    "diagnosis payload needs aggregationId or errorId",
                ));
            }
        }
        Ok(())
    }
}
