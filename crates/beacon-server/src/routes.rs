//! Router Assembly
//!
//! Two surfaces share the state: `/monitor/report` authenticates with the
//! project api key inside its handler; everything else sits behind the
//! bearer-token middleware.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer;
use crate::handlers::{
    ai_diagnosis, aggregations, error_location, error_logs, monitor, ops, source_code,
};
use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let management = Router::new()
        .route("/error-logs", post(error_logs::create).get(error_logs::list))
        .route("/error-logs/batch", post(error_logs::create_batch))
        .route("/error-logs/stats/summary", get(error_logs::stats_summary))
        .route("/error-logs/stats/trend", get(error_logs::stats_trend))
        .route("/error-aggregations", get(aggregations::list))
        .route(
            "/error-aggregations/trigger-aggregation",
            post(aggregations::trigger),
        )
        .route(
            "/error-aggregations/{id}",
            get(aggregations::get)
                .put(aggregations::update)
                .delete(aggregations::delete),
        )
        .route(
            "/error-aggregations/{id}/reanalyze",
            post(aggregations::reanalyze),
        )
        .route("/source-code-version/upload", post(source_code::upload))
        .route("/source-code-version/versions", get(source_code::versions))
        .route("/source-code-version/files", get(source_code::files))
        .route(
            "/source-code-version/file-content/{projectId}/{version}",
            get(source_code::file_content),
        )
        .route(
            "/source-code-version/set-active/{projectId}/{versionId}",
            post(source_code::set_active),
        )
        .route(
            "/source-code-version/{projectId}/{version}",
            delete(source_code::delete),
        )
        .route("/error-location/resolve", post(error_location::resolve))
        .route(
            "/error-location/error/{errorId}/source-code",
            get(error_location::error_source),
        )
        .route("/error-location/clear-cache", post(error_location::clear_cache))
        .route(
            "/ai-diagnosis/error/{id}/analyze",
            post(ai_diagnosis::analyze_error),
        )
        .route(
            "/ai-diagnosis/comprehensive-analysis",
            post(ai_diagnosis::comprehensive),
        )
        .route(
            "/ai-diagnosis/aggregation/{id}/report",
            get(ai_diagnosis::report),
        )
        .route("/queues/stats", get(ops::queue_stats))
        .route("/queues/clean", post(ops::queue_clean))
        .route("/queues/{name}/pause", post(ops::queue_pause))
        .route("/queues/{name}/resume", post(ops::queue_resume))
        .route("/clickhouse/performance/table-stats", get(ops::table_stats))
        .route(
            "/clickhouse/performance/query-metrics",
            get(ops::query_metrics),
        )
        .route("/clickhouse/performance/health", get(ops::clickhouse_health))
        .route("/clickhouse/performance/dashboard", get(ops::dashboard))
        .route("/clickhouse/performance/cleanup", get(ops::cleanup))
        .route(
            "/clickhouse/performance/optimize-table",
            get(ops::optimize),
        )
        .route("/retention/sweep-sourcemaps", post(ops::sweep_sourcemaps))
        .route("/projects", post(ops::create_project).get(ops::list_projects))
        .route("/projects/{id}", get(ops::get_project))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/monitor/report", post(monitor::report))
        .route("/health", get(ops::health))
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
