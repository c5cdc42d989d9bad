//! Columnar Log Store Port
//!
//! Append-only mirror of error logs plus the pre-aggregated statistics the
//! dashboards read. The adapter owns rollup routing: hourly buckets for
//! short ranges, daily buckets for up to a year, base-table scans beyond
//! that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{ErrorType, NewErrorLog};
use crate::error::Result;

/// Time bucket width for statistics queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Hourly buckets (rollup-backed up to 72 h)
    Hour,
    /// Daily buckets (rollup-backed up to 365 d)
    Day,
    /// One bucket for the whole range
    Total,
}

/// Raw-row query against the columnar store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Inclusive lower bound on `created_at`
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to one error type
    pub error_type: Option<ErrorType>,
    /// Max rows returned
    pub limit: u32,
    /// Rows skipped
    pub offset: u32,
    /// Row sampling fraction in (0, 1]; `None` reads everything
    pub sample: Option<f64>,
}

/// Statistics query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Range looking back from now, in hours
    pub time_range_hours: u32,
    /// Bucket width
    pub granularity: Granularity,
    /// Allow rollup tables; `false` forces the base table
    pub use_cache: bool,
}

/// One statistics bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBucket {
    /// Bucket label (`2026-08-01 14:00:00`, `2026-08-01`, or `total`)
    pub bucket: String,
    /// Error type of the bucket
    pub error_type: String,
    /// Occurrences in the bucket
    pub total_count: u64,
    /// Distinct fingerprints in the bucket
    pub unique_hash: u64,
}

/// Trend query (daily or hourly series)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendQuery {
    /// Range looking back from now, in hours
    pub time_range_hours: u32,
    /// Bucket width
    pub granularity: Granularity,
    /// Restrict to one error type
    pub error_type: Option<ErrorType>,
}

/// One trend point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Bucket label
    pub bucket: String,
    /// Occurrences in the bucket
    pub count: u64,
}

/// Summary block for the dashboard head
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    /// Total occurrences in the range
    pub total: u64,
    /// Occurrences per severity level
    pub by_level: Vec<LevelCount>,
    /// Occurrences per error type
    pub by_type: Vec<TypeCount>,
}

/// Per-level slice of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCount {
    /// Severity level 1..4
    pub error_level: u8,
    /// Occurrences at that level
    pub count: u64,
}

/// Per-type slice of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    /// Error type wire name
    pub error_type: String,
    /// Occurrences of that type
    pub count: u64,
}

/// A columnar row as returned by queries (subset of the relational row)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLogRow {
    /// Relational row id the mirror points back at
    pub id: i64,
    /// Owning project
    pub project_id: String,
    /// Error type wire name
    pub error_type: String,
    /// Structural fingerprint
    pub error_hash: String,
    /// Raw error message
    pub error_message: String,
    /// Severity 1..4
    pub error_level: u8,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}

/// Store connectivity report
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    /// Whether the last probe round-tripped
    pub ok: bool,
    /// Whether a connection is currently held
    pub connected: bool,
}

/// Columnar log store operations
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one row (buffered; flushed asynchronously)
    async fn insert(&self, id: i64, log: &NewErrorLog) -> Result<()>;

    /// Append a batch
    async fn insert_batch(&self, rows: &[(i64, NewErrorLog)]) -> Result<()>;

    /// Raw-row query
    async fn query(&self, project_id: &str, query: &LogQuery) -> Result<Vec<StoredLogRow>>;

    /// Bucketed statistics, rollup-routed
    async fn stats(&self, project_id: &str, query: &StatsQuery) -> Result<Vec<StatBucket>>;

    /// Bucketed trend series, rollup-routed
    async fn trend(&self, project_id: &str, query: &TrendQuery) -> Result<Vec<TrendPoint>>;

    /// Summary totals for a date range
    async fn summary(
        &self,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<LogSummary>;

    /// Drop partitions older than `days`; returns affected row estimate
    async fn cleanup_older_than(&self, days: u32) -> Result<u64>;

    /// Run table maintenance (merge parts)
    async fn optimize_table(&self, table: &str) -> Result<()>;

    /// Connectivity probe
    async fn health(&self) -> StoreHealth;
}
