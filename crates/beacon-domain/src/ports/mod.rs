//! Port interfaces
//!
//! Every seam between the application core and an adapter is a trait here.
//! Adapters live in `beacon-infrastructure`; the binary wires them up in
//! `main` and hands them around as explicit `Arc<dyn Trait>` handles.

mod analyzer;
mod archive;
mod log_store;
mod mailer;
mod queue;
mod repositories;
mod sourcemap;

pub use analyzer::ErrorAnalyzer;
pub use archive::{ArchiveStore, ArchiveUpload, FileContent, LocatedSource, UploadOutcome};
pub use log_store::{
    Granularity, LevelCount, LogQuery, LogStore, LogSummary, StatBucket, StatsQuery, StoreHealth,
    StoredLogRow, TrendPoint, TrendQuery, TypeCount,
};
pub use mailer::{AlertEmail, AlertMailer};
pub use queue::{
    ActiveJob, BackoffKind, JobHandler, JobOptions, JobState, QueueCounts, QueueFabric, QueueName,
    QueuePolicy, priority,
};
pub use repositories::{
    AggregationFilter, AggregationRepository, ErrorLogFilter, ErrorLogRepository, FileFilter,
    ProjectRepository, SortOrder, SourceCodeRepository, VersionFilter,
};
pub use sourcemap::{OriginalPosition, ResolvedFrame, SourceContext, SourcemapResolver};
