//! Shared Handler State
//!
//! One cloneable bundle of every service and port handle the handlers
//! need, assembled in `main`. No registry, no lookup: each handler names
//! exactly what it uses.

use std::sync::Arc;

use beacon_application::{DiagnosisService, IngestionService, RetentionService};
use beacon_domain::ports::{
    AggregationRepository, ArchiveStore, ErrorLogRepository, LogStore, ProjectRepository,
    QueueFabric, SourceCodeRepository, SourcemapResolver,
};

/// Everything the HTTP surface reaches, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    /// Synchronous intake (C8)
    pub ingestion: Arc<IngestionService>,
    /// Diagnosis orchestration (C10)
    pub diagnosis: Arc<DiagnosisService>,
    /// Retention operations (C11)
    pub retention: Arc<RetentionService>,
    /// Relational error logs
    pub error_logs: Arc<dyn ErrorLogRepository>,
    /// Aggregation rows
    pub aggregations: Arc<dyn AggregationRepository>,
    /// Columnar store
    pub log_store: Arc<dyn LogStore>,
    /// Queue fabric
    pub queues: Arc<dyn QueueFabric>,
    /// Source archive store (C4)
    pub archive: Arc<dyn ArchiveStore>,
    /// Source-code metadata
    pub source_code: Arc<dyn SourceCodeRepository>,
    /// Sourcemap resolver (C3)
    pub resolver: Arc<dyn SourcemapResolver>,
    /// Project registry
    pub projects: Arc<dyn ProjectRepository>,
    /// Bearer token required on management routes, when configured
    pub auth_token: Option<Arc<str>>,
}
