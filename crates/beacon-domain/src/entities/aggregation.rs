//! Error Aggregation Entities
//!
//! # Overview
//! `ErrorAggregation` rolls up every occurrence sharing a fingerprint inside
//! one project into a single mutable row: counters, representative fields,
//! triage status, and the AI diagnosis with its bounded history.
//!
//! # Invariants
//! - unique key `(project_id, error_hash)`
//! - `first_seen <= last_seen`
//! - `occurrence_count` never decreases
//! - status transitions form the DAG {open→resolved, open→ignored,
//!   resolved→open, ignored→open}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of prior diagnoses retained per aggregation
pub const DIAGNOSIS_HISTORY_LIMIT: usize = 10;

/// Triage status of an aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStatus {
    /// Unresolved, visible in triage queues
    Open,
    /// Marked fixed by a human
    Resolved,
    /// Deliberately muted
    Ignored,
}

impl AggregationStatus {
    /// Storage representation (tinyint column)
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Open => 0,
            Self::Resolved => 1,
            Self::Ignored => 2,
        }
    }

    /// Parse the storage representation
    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            0 => Some(Self::Open),
            1 => Some(Self::Resolved),
            2 => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// Resolved and ignored rows can only be reopened; open rows can move
    /// to either terminal state. Same-state writes are treated as legal
    /// no-ops so idempotent updates do not fail.
    pub fn can_transition(&self, to: Self) -> bool {
        if *self == to {
            return true;
        }
        matches!(
            (self, to),
            (Self::Open, Self::Resolved)
                | (Self::Open, Self::Ignored)
                | (Self::Resolved, Self::Open)
                | (Self::Ignored, Self::Open)
        )
    }
}

/// One prior diagnosis pushed to the history ring before being overwritten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisHistoryEntry {
    /// When the superseded diagnosis was generated
    pub timestamp: DateTime<Utc>,
    /// The superseded diagnosis text
    pub analysis: String,
    /// The superseded fix suggestion, if any
    pub fix_suggestion: Option<String>,
}

/// Rollup row for all occurrences sharing `(project_id, error_hash)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAggregation {
    /// Row identifier
    pub id: i64,
    /// Owning project
    pub project_id: String,
    /// Structural fingerprint
    pub error_hash: String,
    /// Representative error type
    pub error_type: super::ErrorType,
    /// Representative message
    pub error_message: String,
    /// Representative stack trace
    pub error_stack: Option<String>,
    /// Representative minified source file
    pub source_file: Option<String>,
    /// Representative minified line
    pub source_line: Option<u32>,
    /// Representative minified column
    pub source_column: Option<u32>,
    /// First occurrence timestamp
    pub first_seen: DateTime<Utc>,
    /// Most recent occurrence timestamp
    pub last_seen: DateTime<Utc>,
    /// Total occurrences rolled into this row (monotonic, >= 1)
    pub occurrence_count: u64,
    /// Distinct users that hit this error
    pub affected_users: u64,
    /// Triage status
    pub status: AggregationStatus,
    /// Max severity seen across occurrences
    pub error_level: u8,
    /// User the aggregation is assigned to
    pub assigned_to: Option<String>,
    /// Free-form triage notes
    pub notes: Option<String>,
    /// Labels applied by operators
    pub tags: Option<Vec<String>>,
    /// Current AI diagnosis text
    pub ai_diagnosis: Option<String>,
    /// Current AI fix suggestion
    pub ai_fix_suggestion: Option<String>,
    /// Ring of the last superseded diagnoses, newest last
    pub ai_diagnosis_history: Vec<DiagnosisHistoryEntry>,
    /// Full structured analysis report (opaque JSON)
    pub comprehensive_analysis_report: Option<serde_json::Value>,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl ErrorAggregation {
    /// Push one diagnosis onto the history ring, trimming to the newest
    /// [`DIAGNOSIS_HISTORY_LIMIT`] entries. The ring records every
    /// generated diagnosis, the active one included, so the newest entry
    /// always equals `ai_diagnosis`.
    pub fn push_diagnosis_history(&mut self, entry: DiagnosisHistoryEntry) {
        self.ai_diagnosis_history.push(entry);
        let len = self.ai_diagnosis_history.len();
        if len > DIAGNOSIS_HISTORY_LIMIT {
            self.ai_diagnosis_history.drain(..len - DIAGNOSIS_HISTORY_LIMIT);
        }
    }
}

/// Merge payload for one fingerprint group produced by the aggregation engine
#[derive(Debug, Clone)]
pub struct AggregationUpsert {
    /// Owning project
    pub project_id: String,
    /// Fingerprint of the group
    pub error_hash: String,
    /// Representative type (from the newest log in the group)
    pub error_type: super::ErrorType,
    /// Representative message
    pub error_message: String,
    /// Representative stack
    pub error_stack: Option<String>,
    /// Representative minified source file
    pub source_file: Option<String>,
    /// Representative minified line
    pub source_line: Option<u32>,
    /// Representative minified column
    pub source_column: Option<u32>,
    /// Occurrences in this batch
    pub batch_count: u64,
    /// Distinct non-null user ids in this batch
    pub user_ids: Vec<String>,
    /// Max severity in this batch
    pub error_level: u8,
    /// Newest occurrence timestamp in this batch
    pub newest_seen: DateTime<Utc>,
}

/// Outcome of an aggregation upsert, used for alert-threshold checks
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    /// Aggregation row id
    pub id: i64,
    /// Occurrence count before this batch was merged
    pub previous_count: u64,
    /// Occurrence count after the merge
    pub occurrence_count: u64,
}

/// Operator-editable fields, applied through the update operation only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationUpdate {
    /// New triage status (validated against the transition DAG)
    pub status: Option<AggregationStatus>,
    /// New severity override
    pub error_level: Option<u8>,
    /// New notes
    pub notes: Option<String>,
    /// New assignee
    pub assigned_to: Option<String>,
    /// New tags
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dag_permits_reopen_only() {
        use AggregationStatus::*;
        assert!(Open.can_transition(Resolved));
        assert!(Open.can_transition(Ignored));
        assert!(Resolved.can_transition(Open));
        assert!(Ignored.can_transition(Open));
        assert!(!Resolved.can_transition(Ignored));
        assert!(!Ignored.can_transition(Resolved));
        // same-state writes are no-ops, not violations
        assert!(Resolved.can_transition(Resolved));
    }

    fn aggregation_with_diagnosis(text: &str) -> ErrorAggregation {
        let now = Utc::now();
        ErrorAggregation {
            id: 1,
            project_id: "p1".to_owned(),
            error_hash: "h".to_owned(),
            error_type: super::super::ErrorType::JsError,
            error_message: "boom".to_owned(),
            error_stack: None,
            source_file: None,
            source_line: None,
            source_column: None,
            first_seen: now,
            last_seen: now,
            occurrence_count: 1,
            affected_users: 1,
            status: AggregationStatus::Open,
            error_level: 2,
            assigned_to: None,
            notes: None,
            tags: None,
            ai_diagnosis: Some(text.to_owned()),
            ai_fix_suggestion: None,
            ai_diagnosis_history: Vec::new(),
            comprehensive_analysis_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn history_ring_keeps_newest_ten() {
        let mut agg = aggregation_with_diagnosis("d0");
        agg.ai_diagnosis = None;
        for i in 1..=11 {
            let text = format!("d{i}");
            agg.push_diagnosis_history(DiagnosisHistoryEntry {
                timestamp: Utc::now(),
                analysis: text.clone(),
                fix_suggestion: None,
            });
            agg.ai_diagnosis = Some(text);
        }
        assert_eq!(agg.ai_diagnosis_history.len(), DIAGNOSIS_HISTORY_LIMIT);
        // entries 2..=11 survive; d1 was pushed out
        assert_eq!(agg.ai_diagnosis_history[0].analysis, "d2");
        assert_eq!(agg.ai_diagnosis_history[9].analysis, "d11");
        assert_eq!(agg.ai_diagnosis.as_deref(), Some("d11"));
    }
}
