//! Core business entities
//!
//! Plain serde structs; identity and ownership rules live in the doc
//! comments of each type. All entities carry `project_id` as the partition
//! key.

mod aggregation;
mod error_log;
mod project;
mod source_code;

pub use aggregation::{
    AggregationStatus, AggregationUpdate, AggregationUpsert, DIAGNOSIS_HISTORY_LIMIT,
    DiagnosisHistoryEntry, ErrorAggregation, UpsertOutcome,
};
pub use error_log::{ErrorLog, ErrorType, NewErrorLog, ResolvedLocation};
pub use project::{NewProject, Project};
pub use source_code::{
    MAX_INLINE_SIZE, NewSourceCodeFile, NewSourceCodeVersion, SOURCE_FILE_EXTENSIONS,
    SourceCodeFile, SourceCodeVersion, SourceWindow, file_type_for_extension, is_source_extension,
};

use serde::{Deserialize, Serialize};

/// One page of a listing, with the total row count for the filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows of the requested page
    pub items: Vec<T>,
    /// Total rows matching the filter
    pub total: u64,
    /// Requested page number (base-1)
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
}

impl<T> Page<T> {
    /// An empty page echoing the request parameters
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }
}
