//! Project Entity
//!
//! Projects own everything: error logs, aggregations, and source archives
//! are all partitioned by `project_id`. The project row also carries the
//! ingestion configuration (sampling rates, retention, alert threshold) and
//! the API key the browser SDK reports with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored frontend application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Opaque project identifier (partition key everywhere)
    pub project_id: String,
    /// Display name
    pub project_name: String,
    /// Fraction of error reports kept, in (0, 1]
    pub error_sampling_rate: f64,
    /// Fraction of performance reports kept, in (0, 1]
    pub performance_sampling_rate: f64,
    /// Days before columnar rows become sweep-eligible
    pub data_retention_days: u32,
    /// Occurrence count at which an alert email is enqueued
    pub alert_threshold: u64,
    /// Sourcemap behavior knobs (opaque to everything but the resolver)
    pub sourcemap_config: Option<serde_json::Value>,
    /// The single active ingestion key
    pub api_key: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    /// Opaque project identifier
    pub project_id: String,
    /// Display name
    pub project_name: String,
    /// Fraction of error reports kept; defaults to 1.0
    pub error_sampling_rate: Option<f64>,
    /// Fraction of performance reports kept; defaults to 1.0
    pub performance_sampling_rate: Option<f64>,
    /// Retention in days; defaults to 90
    pub data_retention_days: Option<u32>,
    /// Alert threshold; defaults to 100
    pub alert_threshold: Option<u64>,
    /// Sourcemap behavior knobs
    pub sourcemap_config: Option<serde_json::Value>,
}
