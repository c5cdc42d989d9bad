//! Error Log Entities
//!
//! # Overview
//! `ErrorLog` is the append-only record of a single error occurrence as
//! reported by a browser SDK. Rows are immutable once written, except for
//! the source-resolution and diagnosis fields which transition from unset
//! to set at most once (re-setting to an equal value is tolerated so
//! duplicate workers stay idempotent).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a reported error occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    /// Uncaught JavaScript exception
    JsError,
    /// Unhandled promise rejection
    PromiseRejection,
    /// Failed resource load (script, stylesheet, image)
    ResourceError,
    /// Failed HTTP/XHR/fetch request
    HttpError,
    /// SDK-user reported error
    CustomError,
}

impl ErrorType {
    /// Wire/storage representation of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsError => "jsError",
            Self::PromiseRejection => "promiseRejection",
            Self::ResourceError => "resourceError",
            Self::HttpError => "httpError",
            Self::CustomError => "customError",
        }
    }

    /// Parse the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jsError" => Some(Self::JsError),
            "promiseRejection" => Some(Self::PromiseRejection),
            "resourceError" => Some(Self::ResourceError),
            "httpError" => Some(Self::HttpError),
            "customError" => Some(Self::CustomError),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored error occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    /// Monotonic row identifier
    pub id: i64,
    /// Owning project (partition key)
    pub project_id: String,
    /// Category of the occurrence
    pub error_type: ErrorType,
    /// Structural fingerprint grouping same-shape errors
    pub error_hash: String,
    /// Raw error message
    pub error_message: String,
    /// Raw stack trace text, if captured
    pub error_stack: Option<String>,
    /// Page URL at the time of the error
    pub page_url: Option<String>,
    /// End-user identifier, if known
    pub user_id: Option<String>,
    /// Browser user agent string
    pub user_agent: Option<String>,
    /// Opaque device description (decoded only by the diagnosis orchestrator)
    pub device_info: Option<serde_json::Value>,
    /// Opaque network description
    pub network_info: Option<serde_json::Value>,
    /// Opaque performance payload
    pub performance_data: Option<serde_json::Value>,
    /// Minified source file of the top frame
    pub source_file: Option<String>,
    /// Minified line (base-1)
    pub source_line: Option<u32>,
    /// Minified column (base-1)
    pub source_column: Option<u32>,
    /// Project release version the page was running
    pub project_version: Option<String>,
    /// Build identifier of that release
    pub build_id: Option<String>,
    /// Original source path after sourcemap resolution
    pub original_source: Option<String>,
    /// Original line after resolution
    pub original_line: Option<u32>,
    /// Original column after resolution
    pub original_column: Option<u32>,
    /// Original function name after resolution
    pub function_name: Option<String>,
    /// Context lines around the original position, joined with newlines
    pub source_snippet: Option<String>,
    /// Monotonic false→true once resolution has run
    pub is_source_resolved: bool,
    /// Short AI diagnosis text
    pub ai_diagnosis: Option<String>,
    /// Full structured analysis report (opaque JSON)
    pub comprehensive_analysis_report: Option<serde_json::Value>,
    /// When the comprehensive report was generated
    pub comprehensive_analysis_generated_at: Option<DateTime<Utc>>,
    /// Severity 1 (info) .. 4 (critical)
    pub error_level: u8,
    /// Set once the aggregation engine has counted this row
    pub is_processed: bool,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new error occurrence (id assigned by the store)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewErrorLog {
    /// Owning project
    pub project_id: String,
    /// Category of the occurrence
    pub error_type: ErrorType,
    /// Structural fingerprint (computed at intake)
    pub error_hash: String,
    /// Raw error message
    pub error_message: String,
    /// Raw stack trace text
    pub error_stack: Option<String>,
    /// Page URL
    pub page_url: Option<String>,
    /// End-user identifier
    pub user_id: Option<String>,
    /// Browser user agent
    pub user_agent: Option<String>,
    /// Opaque device description
    pub device_info: Option<serde_json::Value>,
    /// Opaque network description
    pub network_info: Option<serde_json::Value>,
    /// Opaque performance payload
    pub performance_data: Option<serde_json::Value>,
    /// Minified source file
    pub source_file: Option<String>,
    /// Minified line
    pub source_line: Option<u32>,
    /// Minified column
    pub source_column: Option<u32>,
    /// Project release version
    pub project_version: Option<String>,
    /// Build identifier
    pub build_id: Option<String>,
    /// Severity 1..4
    pub error_level: u8,
    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of resolving a log's top frame against a source map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// Original source path from the map
    pub original_source: String,
    /// Original line (base-1)
    pub original_line: u32,
    /// Original column (base-1)
    pub original_column: u32,
    /// Function name at the original position, if the map knows it
    pub function_name: Option<String>,
    /// Context lines around the position, joined with newlines
    pub source_snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_round_trips_through_wire_form() {
        for t in [
            ErrorType::JsError,
            ErrorType::PromiseRejection,
            ErrorType::ResourceError,
            ErrorType::HttpError,
            ErrorType::CustomError,
        ] {
            assert_eq!(ErrorType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ErrorType::parse("syntaxError"), None);
    }

    #[test]
    fn error_type_serde_uses_camel_case() {
        let json = serde_json::to_string(&ErrorType::PromiseRejection).unwrap();
        assert_eq!(json, "\"promiseRejection\"");
    }
}
