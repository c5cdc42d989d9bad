//! In-memory fakes of the domain ports.
//!
//! Compiled only with the `test-utils` feature; the use-case tests and the
//! HTTP handler tests both drive the real services against these.
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use beacon_domain::entities::{
    AggregationStatus, AggregationUpdate, AggregationUpsert, DiagnosisHistoryEntry,
    ErrorAggregation, ErrorLog, NewErrorLog, NewProject, NewSourceCodeFile, NewSourceCodeVersion,
    Page, Project, ResolvedLocation, SourceCodeFile, SourceCodeVersion, UpsertOutcome,
};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ActiveJob, AggregationFilter, AggregationRepository, AlertEmail, AlertMailer, ArchiveStore,
    ArchiveUpload, ErrorAnalyzer, ErrorLogFilter, ErrorLogRepository, FileContent, FileFilter,
    JobOptions, LocatedSource, OriginalPosition, ProjectRepository, QueueCounts, QueueFabric,
    QueueName, ResolvedFrame, SourceCodeRepository, SourceContext, SourcemapResolver, UploadOutcome,
    VersionFilter,
};
use beacon_domain::stack::StackFrame;

fn new_log_to_row(id: i64, log: &NewErrorLog) -> ErrorLog {
    ErrorLog {
        id,
        project_id: log.project_id.clone(),
        error_type: log.error_type,
        error_hash: log.error_hash.clone(),
        error_message: log.error_message.clone(),
        error_stack: log.error_stack.clone(),
        page_url: log.page_url.clone(),
        user_id: log.user_id.clone(),
        user_agent: log.user_agent.clone(),
        device_info: log.device_info.clone(),
        network_info: log.network_info.clone(),
        performance_data: log.performance_data.clone(),
        source_file: log.source_file.clone(),
        source_line: log.source_line,
        source_column: log.source_column,
        project_version: log.project_version.clone(),
        build_id: log.build_id.clone(),
        original_source: None,
        original_line: None,
        original_column: None,
        function_name: None,
        source_snippet: None,
        is_source_resolved: false,
        ai_diagnosis: None,
        comprehensive_analysis_report: None,
        comprehensive_analysis_generated_at: None,
        error_level: log.error_level,
        is_processed: false,
        created_at: log.created_at,
    }
}

/// Vec-backed error log repository
#[derive(Default)]
pub struct MemErrorLogRepo {
    pub rows: Mutex<Vec<ErrorLog>>,
}

#[async_trait]
impl ErrorLogRepository for MemErrorLogRepo {
    async fn insert(&self, log: &NewErrorLog) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(new_log_to_row(id, log));
        Ok(id)
    }

    async fn insert_batch(&self, logs: &[NewErrorLog]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(logs.len());
        let mut rows = self.rows.lock().unwrap();
        for log in logs {
            let id = rows.len() as i64 + 1;
            rows.push(new_log_to_row(id, log));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorLog>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn query(&self, filter: &ErrorLogFilter) -> Result<Page<ErrorLog>> {
        let rows = self.rows.lock().unwrap();
        let items: Vec<ErrorLog> = rows
            .iter()
            .filter(|r| r.project_id == filter.project_id)
            .cloned()
            .collect();
        let total = items.len() as u64;
        Ok(Page {
            items,
            total,
            page: filter.page.unwrap_or(1),
            page_size: filter.limit.unwrap_or(20),
        })
    }

    async fn find_unprocessed(&self, project_id: &str, limit: u32) -> Result<Vec<ErrorLog>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.project_id == project_id && !r.is_processed)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, ids: &[i64]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if ids.contains(&row.id) {
                row.is_processed = true;
            }
        }
        Ok(())
    }

    async fn apply_resolution(&self, id: i64, resolution: &ResolvedLocation) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("error log {id}")))?;
        row.original_source = Some(resolution.original_source.clone());
        row.original_line = Some(resolution.original_line);
        row.original_column = Some(resolution.original_column);
        row.function_name = resolution.function_name.clone();
        row.source_snippet = resolution.source_snippet.clone();
        row.is_source_resolved = true;
        Ok(())
    }

    async fn mirror_diagnosis(
        &self,
        project_id: &str,
        error_hash: &str,
        diagnosis: &str,
        report: &serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut touched = 0;
        for row in rows.iter_mut() {
            if row.project_id == project_id && row.error_hash == error_hash {
                row.ai_diagnosis = Some(diagnosis.to_owned());
                row.comprehensive_analysis_report = Some(report.clone());
                row.comprehensive_analysis_generated_at = Some(generated_at);
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// Map-backed aggregation repository with exact distinct users
#[derive(Default)]
pub struct MemAggregationRepo {
    pub rows: Mutex<Vec<ErrorAggregation>>,
    users: Mutex<BTreeMap<i64, BTreeSet<String>>>,
}

#[async_trait]
impl AggregationRepository for MemAggregationRepo {
    async fn upsert(&self, upsert: &AggregationUpsert) -> Result<UpsertOutcome> {
        let mut rows = self.rows.lock().unwrap();
        let mut users = self.users.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.project_id == upsert.project_id && r.error_hash == upsert.error_hash)
        {
            let previous = row.occurrence_count;
            row.occurrence_count += upsert.batch_count;
            row.last_seen = row.last_seen.max(upsert.newest_seen);
            row.error_level = row.error_level.max(upsert.error_level);
            let set = users.entry(row.id).or_default();
            for user in &upsert.user_ids {
                set.insert(user.clone());
            }
            row.affected_users = set.len() as u64;
            return Ok(UpsertOutcome {
                id: row.id,
                previous_count: previous,
                occurrence_count: row.occurrence_count,
            });
        }

        let id = rows.len() as i64 + 1;
        let set: BTreeSet<String> = upsert.user_ids.iter().cloned().collect();
        let now = Utc::now();
        rows.push(ErrorAggregation {
            id,
            project_id: upsert.project_id.clone(),
            error_hash: upsert.error_hash.clone(),
            error_type: upsert.error_type,
            error_message: upsert.error_message.clone(),
            error_stack: upsert.error_stack.clone(),
            source_file: upsert.source_file.clone(),
            source_line: upsert.source_line,
            source_column: upsert.source_column,
            first_seen: upsert.newest_seen,
            last_seen: upsert.newest_seen,
            occurrence_count: upsert.batch_count,
            affected_users: set.len() as u64,
            status: AggregationStatus::Open,
            error_level: upsert.error_level,
            assigned_to: None,
            notes: None,
            tags: None,
            ai_diagnosis: None,
            ai_fix_suggestion: None,
            ai_diagnosis_history: Vec::new(),
            comprehensive_analysis_report: None,
            created_at: now,
            updated_at: now,
        });
        users.insert(id, set);
        Ok(UpsertOutcome {
            id,
            previous_count: 0,
            occurrence_count: upsert.batch_count,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorAggregation>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_hash(
        &self,
        project_id: &str,
        error_hash: &str,
    ) -> Result<Option<ErrorAggregation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.project_id == project_id && r.error_hash == error_hash)
            .cloned())
    }

    async fn query(&self, filter: &AggregationFilter) -> Result<Page<ErrorAggregation>> {
        let rows = self.rows.lock().unwrap();
        let items: Vec<ErrorAggregation> = rows
            .iter()
            .filter(|r| {
                filter
                    .project_id
                    .as_ref()
                    .is_none_or(|p| &r.project_id == p)
            })
            .cloned()
            .collect();
        let total = items.len() as u64;
        Ok(Page {
            items,
            total,
            page: filter.page.unwrap_or(1),
            page_size: filter.limit.unwrap_or(20),
        })
    }

    async fn update(&self, id: i64, update: &AggregationUpdate) -> Result<ErrorAggregation> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
        if let Some(status) = update.status {
            row.status = status;
        }
        if let Some(level) = update.error_level {
            row.error_level = level;
        }
        if let Some(notes) = &update.notes {
            row.notes = Some(notes.clone());
        }
        if let Some(assigned) = &update.assigned_to {
            row.assigned_to = Some(assigned.clone());
        }
        if let Some(tags) = &update.tags {
            row.tags = Some(tags.clone());
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.rows.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn record_diagnosis(
        &self,
        id: i64,
        diagnosis: &str,
        fix_suggestion: Option<&str>,
        history: &[DiagnosisHistoryEntry],
        report: &serde_json::Value,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
        row.ai_diagnosis = Some(diagnosis.to_owned());
        row.ai_fix_suggestion = fix_suggestion.map(str::to_owned);
        row.ai_diagnosis_history = history.to_vec();
        row.comprehensive_analysis_report = Some(report.clone());
        row.updated_at = Utc::now();
        Ok(())
    }
}

/// Fixed-project registry
pub struct MemProjectRepo {
    pub projects: Mutex<Vec<Project>>,
}

impl MemProjectRepo {
    pub fn with_project(project_id: &str, alert_threshold: u64, sampling: f64) -> Self {
        Self {
            projects: Mutex::new(vec![Project {
                project_id: project_id.to_owned(),
                project_name: project_id.to_owned(),
                error_sampling_rate: sampling,
                performance_sampling_rate: 1.0,
                data_retention_days: 90,
                alert_threshold,
                sourcemap_config: None,
                api_key: format!("key-{project_id}"),
                created_at: Utc::now(),
            }]),
        }
    }
}

#[async_trait]
impl ProjectRepository for MemProjectRepo {
    async fn create(&self, project: &NewProject) -> Result<Project> {
        let row = Project {
            project_id: project.project_id.clone(),
            project_name: project.project_name.clone(),
            error_sampling_rate: project.error_sampling_rate.unwrap_or(1.0),
            performance_sampling_rate: project.performance_sampling_rate.unwrap_or(1.0),
            data_retention_days: project.data_retention_days.unwrap_or(90),
            alert_threshold: project.alert_threshold.unwrap_or(100),
            sourcemap_config: project.sourcemap_config.clone(),
            api_key: format!("key-{}", project.project_id),
            created_at: Utc::now(),
        };
        self.projects.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.project_id == project_id)
            .cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Project>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.api_key == api_key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        Ok(self.projects.lock().unwrap().clone())
    }
}

/// Queue fabric that records every add
#[derive(Default)]
pub struct RecordingQueue {
    pub added: Mutex<Vec<(QueueName, String, serde_json::Value, i8)>>,
}

impl RecordingQueue {
    pub fn count(&self, queue: QueueName) -> usize {
        self.added.lock().unwrap().iter().filter(|(q, ..)| *q == queue).count()
    }
}

#[async_trait]
impl QueueFabric for RecordingQueue {
    async fn add(
        &self,
        queue: QueueName,
        job_type: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<String> {
        let mut added = self.added.lock().unwrap();
        added.push((queue, job_type.to_owned(), payload, opts.priority));
        Ok(format!("job-{}", added.len()))
    }

    async fn pause(&self, _queue: QueueName) -> Result<()> {
        Ok(())
    }

    async fn resume(&self, _queue: QueueName) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<Vec<(QueueName, QueueCounts)>> {
        Ok(Vec::new())
    }

    async fn clean(
        &self,
        _queue: QueueName,
        _completed_older_than: Duration,
        _failed_older_than: Duration,
    ) -> Result<u64> {
        Ok(0)
    }
}

/// Log store that counts inserts and can be told to fail
#[derive(Default)]
pub struct MemLogStore {
    pub inserted: Mutex<u64>,
    pub fail_inserts: bool,
}

#[async_trait]
impl beacon_domain::ports::LogStore for MemLogStore {
    async fn insert(&self, _id: i64, _log: &NewErrorLog) -> Result<()> {
        if self.fail_inserts {
            return Err(Error::unavailable("columnar store down"));
        }
        *self.inserted.lock().unwrap() += 1;
        Ok(())
    }

    async fn insert_batch(&self, rows: &[(i64, NewErrorLog)]) -> Result<()> {
        if self.fail_inserts {
            return Err(Error::unavailable("columnar store down"));
        }
        *self.inserted.lock().unwrap() += rows.len() as u64;
        Ok(())
    }

    async fn query(
        &self,
        _project_id: &str,
        _query: &beacon_domain::ports::LogQuery,
    ) -> Result<Vec<beacon_domain::ports::StoredLogRow>> {
        Ok(Vec::new())
    }

    async fn stats(
        &self,
        _project_id: &str,
        _query: &beacon_domain::ports::StatsQuery,
    ) -> Result<Vec<beacon_domain::ports::StatBucket>> {
        Ok(Vec::new())
    }

    async fn trend(
        &self,
        _project_id: &str,
        _query: &beacon_domain::ports::TrendQuery,
    ) -> Result<Vec<beacon_domain::ports::TrendPoint>> {
        Ok(Vec::new())
    }

    async fn summary(
        &self,
        _project_id: &str,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<beacon_domain::ports::LogSummary> {
        Ok(beacon_domain::ports::LogSummary::default())
    }

    async fn cleanup_older_than(&self, _days: u32) -> Result<u64> {
        Ok(0)
    }

    async fn optimize_table(&self, _table: &str) -> Result<()> {
        Ok(())
    }

    async fn health(&self) -> beacon_domain::ports::StoreHealth {
        beacon_domain::ports::StoreHealth {
            ok: true,
            connected: true,
        }
    }
}

/// Resolver returning a fixed original position for every frame
pub struct FixedResolver {
    pub position: Option<OriginalPosition>,
    pub context: Option<SourceContext>,
}

#[async_trait]
impl SourcemapResolver for FixedResolver {
    async fn resolve(
        &self,
        _project_id: &str,
        _version: &str,
        frames: &[StackFrame],
    ) -> Result<Vec<ResolvedFrame>> {
        Ok(frames
            .iter()
            .map(|f| ResolvedFrame {
                frame: f.clone(),
                original: self.position.clone(),
                context: self.context.clone(),
            })
            .collect())
    }

    async fn resolve_one(
        &self,
        _project_id: &str,
        _version: &str,
        frame: &StackFrame,
    ) -> Result<ResolvedFrame> {
        Ok(ResolvedFrame {
            frame: frame.clone(),
            original: self.position.clone(),
            context: self.context.clone(),
        })
    }

    async fn clear_cache(&self) -> usize {
        0
    }

    async fn cache_len(&self) -> usize {
        0
    }
}

/// Source-code repository exposing one active version
pub struct MemSourceCodeRepo {
    pub active: Option<SourceCodeVersion>,
}

impl MemSourceCodeRepo {
    pub fn with_active(project_id: &str, version: &str) -> Self {
        Self {
            active: Some(SourceCodeVersion {
                id: 1,
                project_id: project_id.to_owned(),
                version: version.to_owned(),
                build_id: None,
                branch_name: None,
                commit_message: None,
                storage_path: "/tmp/beacon".to_owned(),
                archive_name: "src.zip".to_owned(),
                archive_size: 0,
                uploaded_by: None,
                description: None,
                is_active: true,
                has_sourcemap: true,
                sourcemap_version: None,
                sourcemap_associated_at: None,
                created_at: Utc::now(),
            }),
        }
    }

    pub fn empty() -> Self {
        Self { active: None }
    }
}

#[async_trait]
impl SourceCodeRepository for MemSourceCodeRepo {
    async fn insert_version(
        &self,
        _version: &NewSourceCodeVersion,
        _files: &[NewSourceCodeFile],
    ) -> Result<i64> {
        Ok(1)
    }

    async fn delete_versions(&self, _project_id: &str, _version: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn query_versions(&self, filter: &VersionFilter) -> Result<Page<SourceCodeVersion>> {
        Ok(Page::empty(
            filter.page.unwrap_or(1),
            filter.page_size.unwrap_or(20),
        ))
    }

    async fn find_version(&self, _id: i64) -> Result<Option<SourceCodeVersion>> {
        Ok(self.active.clone())
    }

    async fn find_version_by_name(
        &self,
        _project_id: &str,
        _version: &str,
    ) -> Result<Option<SourceCodeVersion>> {
        Ok(self.active.clone())
    }

    async fn find_active_version(&self, _project_id: &str) -> Result<Option<SourceCodeVersion>> {
        Ok(self.active.clone())
    }

    async fn set_active(&self, _project_id: &str, _version_id: i64) -> Result<()> {
        Ok(())
    }

    async fn query_files(&self, filter: &FileFilter) -> Result<Page<SourceCodeFile>> {
        Ok(Page::empty(
            filter.page.unwrap_or(1),
            filter.page_size.unwrap_or(20),
        ))
    }

    async fn find_file(&self, _version_id: i64, _file_path: &str) -> Result<Option<SourceCodeFile>> {
        Ok(None)
    }
}

/// Archive store with no content
pub struct EmptyArchive;

#[async_trait]
impl ArchiveStore for EmptyArchive {
    async fn upload(&self, _upload: ArchiveUpload) -> Result<UploadOutcome> {
        Err(Error::bad_request("unsupported in tests"))
    }

    async fn file_content(&self, _version_id: i64, file_path: &str) -> Result<FileContent> {
        Err(Error::not_found(file_path.to_owned()))
    }

    async fn by_location(
        &self,
        _project_id: &str,
        _version: Option<&str>,
        file_path: &str,
        _line_number: Option<u32>,
        _context_lines: u32,
    ) -> Result<LocatedSource> {
        Err(Error::not_found(file_path.to_owned()))
    }

    async fn delete(&self, _project_id: &str, _version: &str) -> Result<()> {
        Ok(())
    }
}

/// Analyzer returning a canned completion, counting calls
pub struct CannedAnalyzer {
    pub response: String,
    pub calls: Mutex<u32>,
    pub enabled: bool,
}

impl CannedAnalyzer {
    pub fn json(summary: &str) -> Self {
        Self {
            response: format!(
                r#"{{"rootCause": "{summary} root", "summary": "{summary}", "technicalDetails": "td", "fixSuggestions": [{{"priority": 1, "suggestion": "fix it"}}]}}"#
            ),
            calls: Mutex::new(0),
            enabled: true,
        }
    }
}

#[async_trait]
impl ErrorAnalyzer for CannedAnalyzer {
    async fn analyze(&self, _prompt: &str) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.response.clone())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Mailer recording alerts
#[derive(Default)]
pub struct RecordingMailer {
    pub alerts: Mutex<Vec<AlertEmail>>,
}

#[async_trait]
impl AlertMailer for RecordingMailer {
    async fn send_alert(&self, alert: &AlertEmail) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Build an [`ActiveJob`] for handler tests
pub fn job(queue: QueueName, payload: serde_json::Value) -> ActiveJob {
    ActiveJob {
        id: "job-test".to_owned(),
        queue,
        job_type: "test".to_owned(),
        payload,
        attempt: 1,
        max_attempts: queue.policy().max_attempts,
    }
}
