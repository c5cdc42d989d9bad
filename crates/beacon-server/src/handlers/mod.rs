//! Request handlers, grouped by surface area

pub mod ai_diagnosis;
pub mod aggregations;
pub mod error_location;
pub mod error_logs;
pub mod monitor;
pub mod ops;
pub mod source_code;
