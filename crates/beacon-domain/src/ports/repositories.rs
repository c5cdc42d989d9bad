//! Relational Repository Ports
//!
//! CRUD seams over the metadata store. Every mutation that spans multiple
//! rows (batch insert, upload replace, set-active) is one transaction
//! inside the adapter; callers never see partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{
    AggregationUpdate, AggregationUpsert, ErrorAggregation, ErrorLog, ErrorType, NewErrorLog,
    NewProject, NewSourceCodeFile, NewSourceCodeVersion, Page, Project, ResolvedLocation,
    SourceCodeFile, SourceCodeVersion, UpsertOutcome,
};
use crate::error::Result;

/// Listing sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// Filter for the error-log listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogFilter {
    /// Owning project (required on the wire)
    pub project_id: String,
    /// Restrict to one error type
    pub error_type: Option<ErrorType>,
    /// Restrict to one severity level
    pub error_level: Option<u8>,
    /// Substring match against message and stack
    pub keyword: Option<String>,
    /// Restrict to one minified source file
    pub source_file: Option<String>,
    /// Restrict to one page URL
    pub page_url: Option<String>,
    /// Restrict to one end user
    pub user_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end_date: Option<DateTime<Utc>>,
    /// Page number (base-1)
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
    /// Column to sort by (whitelisted by the adapter)
    pub sort_field: Option<String>,
    /// Sort direction
    pub sort_order: Option<SortOrder>,
}

/// Error-log persistence and resolution/diagnosis write-back
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    /// Insert one occurrence, returning its assigned id
    async fn insert(&self, log: &NewErrorLog) -> Result<i64>;

    /// Insert a batch atomically; all ids or none
    async fn insert_batch(&self, logs: &[NewErrorLog]) -> Result<Vec<i64>>;

    /// Fetch one occurrence
    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorLog>>;

    /// Paged listing per filter
    async fn query(&self, filter: &ErrorLogFilter) -> Result<Page<ErrorLog>>;

    /// Oldest unaggregated occurrences of a project, bounded
    async fn find_unprocessed(&self, project_id: &str, limit: u32) -> Result<Vec<ErrorLog>>;

    /// Mark occurrences as counted by the aggregation engine
    async fn mark_processed(&self, ids: &[i64]) -> Result<()>;

    /// Write the sourcemap resolution back (sets `is_source_resolved`).
    /// Idempotent: re-applying an equal resolution is accepted.
    async fn apply_resolution(&self, id: i64, resolution: &ResolvedLocation) -> Result<()>;

    /// Mirror a diagnosis onto every log sharing the aggregation's hash
    async fn mirror_diagnosis(
        &self,
        project_id: &str,
        error_hash: &str,
        diagnosis: &str,
        report: &serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Filter for the aggregation listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationFilter {
    /// Restrict to one project
    pub project_id: Option<String>,
    /// Restrict to one triage status (storage form 0/1/2)
    pub status: Option<i8>,
    /// Restrict to one error type
    pub error_type: Option<ErrorType>,
    /// Substring match against the representative message
    pub keyword: Option<String>,
    /// Page number (base-1)
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
}

/// Aggregation rollup persistence
#[async_trait]
pub trait AggregationRepository: Send + Sync {
    /// Merge one fingerprint group into its row, creating it when absent.
    /// Atomic against concurrent writers of the same `(project, hash)`.
    async fn upsert(&self, upsert: &AggregationUpsert) -> Result<UpsertOutcome>;

    /// Fetch one aggregation
    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorAggregation>>;

    /// Fetch by natural key
    async fn find_by_hash(&self, project_id: &str, error_hash: &str)
    -> Result<Option<ErrorAggregation>>;

    /// Paged listing per filter
    async fn query(&self, filter: &AggregationFilter) -> Result<Page<ErrorAggregation>>;

    /// Apply operator-editable fields. The caller validates the status
    /// transition; the adapter persists whatever it is given.
    async fn update(&self, id: i64, update: &AggregationUpdate) -> Result<ErrorAggregation>;

    /// Delete one aggregation
    async fn delete(&self, id: i64) -> Result<()>;

    /// Replace the diagnosis fields and history ring in one write
    async fn record_diagnosis(
        &self,
        id: i64,
        diagnosis: &str,
        fix_suggestion: Option<&str>,
        history: &[crate::entities::DiagnosisHistoryEntry],
        report: &serde_json::Value,
    ) -> Result<()>;
}

/// Filter for the version listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFilter {
    /// Owning project
    pub project_id: String,
    /// Restrict to one version string
    pub version: Option<String>,
    /// Page number (base-1)
    pub page: Option<u32>,
    /// Page size
    pub page_size: Option<u32>,
}

/// Filter for the file listing; at least one selector must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFilter {
    /// Select by owning version id
    pub version_id: Option<i64>,
    /// Select by project (with optional version)
    pub project_id: Option<String>,
    /// Version string, paired with `project_id`
    pub version: Option<String>,
    /// Substring match on the basename
    pub file_name: Option<String>,
    /// Page number (base-1)
    pub page: Option<u32>,
    /// Page size
    pub page_size: Option<u32>,
}

/// Source archive metadata persistence
#[async_trait]
pub trait SourceCodeRepository: Send + Sync {
    /// Insert a version and its files in one transaction; returns the
    /// version id
    async fn insert_version(
        &self,
        version: &NewSourceCodeVersion,
        files: &[NewSourceCodeFile],
    ) -> Result<i64>;

    /// Delete every row matching `(project, version)` with its files,
    /// returning the storage paths of the removed rows
    async fn delete_versions(&self, project_id: &str, version: &str) -> Result<Vec<String>>;

    /// Paged version listing
    async fn query_versions(&self, filter: &VersionFilter) -> Result<Page<SourceCodeVersion>>;

    /// Fetch one version by id
    async fn find_version(&self, id: i64) -> Result<Option<SourceCodeVersion>>;

    /// Fetch one version by natural key (newest when duplicated mid-replace)
    async fn find_version_by_name(
        &self,
        project_id: &str,
        version: &str,
    ) -> Result<Option<SourceCodeVersion>>;

    /// The project's active version, if any
    async fn find_active_version(&self, project_id: &str) -> Result<Option<SourceCodeVersion>>;

    /// Clear every active flag of the project, then set one. Transactional.
    async fn set_active(&self, project_id: &str, version_id: i64) -> Result<()>;

    /// Paged file listing
    async fn query_files(&self, filter: &FileFilter) -> Result<Page<SourceCodeFile>>;

    /// Fetch one file of a version by archive-relative path
    async fn find_file(&self, version_id: i64, file_path: &str) -> Result<Option<SourceCodeFile>>;
}

/// Project registry
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Create a project (generates the api key)
    async fn create(&self, project: &NewProject) -> Result<Project>;

    /// Fetch by id
    async fn find_by_id(&self, project_id: &str) -> Result<Option<Project>>;

    /// Fetch by ingestion api key
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Project>>;

    /// All projects (admin listing; bounded by the adapter)
    async fn list(&self) -> Result<Vec<Project>>;
}
