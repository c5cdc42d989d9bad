//! Operational endpoints: health, queue management, columnar maintenance,
//! project administration.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use beacon_domain::Error;
use beacon_domain::entities::{NewProject, Project};
use beacon_domain::ports::{Granularity, QueueName, StatsQuery, TrendQuery};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Retained-completed jobs older than this are cleanable
const CLEAN_COMPLETED_AFTER: Duration = Duration::from_secs(24 * 3600);
/// Retained-failed jobs older than this are cleanable
const CLEAN_FAILED_AFTER: Duration = Duration::from_secs(7 * 24 * 3600);

/// `GET /health` — aggregate process health
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let columnar = state.log_store.health().await;
    let queues = state.queues.stats().await.is_ok();
    Ok(Json(ApiResponse::ok(json!({
        "clickhouse": columnar,
        "queues": { "ok": queues },
    }))))
}

/// `GET /queues/stats` — per-queue counts
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let stats = state.queues.stats().await?;
    let mut body = serde_json::Map::new();
    for (queue, counts) in stats {
        body.insert(queue.as_str().to_owned(), serde_json::to_value(counts)?);
    }
    Ok(Json(ApiResponse::ok(serde_json::Value::Object(body))))
}

fn parse_queue(name: &str) -> Result<QueueName, ApiError> {
    QueueName::parse(name)
        .ok_or_else(|| Error::not_found(format!("queue {name}")).into())
}

/// `POST /queues/{name}/pause`
pub async fn queue_pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.queues.pause(parse_queue(&name)?).await?;
    Ok(Json(ApiResponse::message(format!("queue {name} paused"))))
}

/// `POST /queues/{name}/resume`
pub async fn queue_resume(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.queues.resume(parse_queue(&name)?).await?;
    Ok(Json(ApiResponse::message(format!("queue {name} resumed"))))
}

/// `POST /queues/clean` — drop stale terminal jobs on every queue
pub async fn queue_clean(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut removed = 0;
    for queue in QueueName::ALL {
        removed += state
            .queues
            .clean(queue, CLEAN_COMPLETED_AFTER, CLEAN_FAILED_AFTER)
            .await?;
    }
    Ok(Json(ApiResponse::with_message(
        "queues cleaned",
        json!({ "removed": removed }),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatsParams {
    project_id: String,
    hours: Option<u32>,
    granularity: Option<Granularity>,
}

/// `GET /clickhouse/performance/table-stats` — rollup-routed buckets
pub async fn table_stats(
    State(state): State<AppState>,
    Query(params): Query<TableStatsParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let buckets = state
        .log_store
        .stats(
            &params.project_id,
            &StatsQuery {
                time_range_hours: params.hours.unwrap_or(24),
                granularity: params.granularity.unwrap_or(Granularity::Hour),
                use_cache: true,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(serde_json::to_value(buckets)?)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetricsParams {
    project_id: String,
    hours: Option<u32>,
}

/// `GET /clickhouse/performance/query-metrics` — hourly ingest series
pub async fn query_metrics(
    State(state): State<AppState>,
    Query(params): Query<QueryMetricsParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let series = state
        .log_store
        .trend(
            &params.project_id,
            &TrendQuery {
                time_range_hours: params.hours.unwrap_or(24),
                granularity: Granularity::Hour,
                error_type: None,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(serde_json::to_value(series)?)))
}

/// `GET /clickhouse/performance/health`
pub async fn clickhouse_health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let health = state.log_store.health().await;
    Ok(Json(ApiResponse::ok(serde_json::to_value(health)?)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParams {
    project_id: String,
}

/// `GET /clickhouse/performance/dashboard` — summary + daily trend bundle
pub async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let summary = state.log_store.summary(&params.project_id, None, None).await?;
    let trend = state
        .log_store
        .trend(
            &params.project_id,
            &TrendQuery {
                time_range_hours: 7 * 24,
                granularity: Granularity::Day,
                error_type: None,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(json!({
        "summary": summary,
        "trend": trend,
    }))))
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    days: Option<u32>,
}

/// `GET /clickhouse/performance/cleanup?days=` — manual partition sweep
pub async fn cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let days = params.days.unwrap_or(90);
    let affected = state.retention.cleanup_columnar(days).await?;
    Ok(Json(ApiResponse::with_message(
        "cleanup issued",
        json!({ "days": days, "affected": affected }),
    )))
}

#[derive(Debug, Deserialize)]
pub struct OptimizeParams {
    table: Option<String>,
}

/// `GET /clickhouse/performance/optimize-table?table=` — manual optimize
pub async fn optimize(
    State(state): State<AppState>,
    Query(params): Query<OptimizeParams>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let table = params.table.unwrap_or_else(|| "error_logs".to_owned());
    state.retention.optimize_table(&table).await?;
    Ok(Json(ApiResponse::message(format!("optimize issued for {table}"))))
}

/// `POST /retention/sweep-sourcemaps` — manual sourcemap TTL sweep
pub async fn sweep_sourcemaps(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let removed = state.retention.sweep_sourcemaps().await?;
    Ok(Json(ApiResponse::with_message(
        "sweep complete",
        json!({ "removed": removed }),
    )))
}

/// `POST /projects` — register a project (generates its api key)
pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<NewProject>,
) -> Result<Json<ApiResponse<Project>>, ApiError> {
    if body.project_id.trim().is_empty() {
        return Err(Error::bad_request("projectId is required").into());
    }
    let project = state.projects.create(&body).await?;
    Ok(Json(ApiResponse::with_message("project created", project)))
}

/// `GET /projects`
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Project>>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.projects.list().await?)))
}

/// `GET /projects/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Project>>, ApiError> {
    let project = state
        .projects
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::not_found(format!("project {id}")))?;
    Ok(Json(ApiResponse::ok(project)))
}
