//! Error-log ingestion and listing endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use beacon_application::{BatchRowOutcome, ErrorReport};
use beacon_domain::Error;
use beacon_domain::entities::{ErrorLog, ErrorType, Page};
use beacon_domain::ports::{ErrorLogFilter, Granularity, LogSummary, SortOrder, TrendPoint, TrendQuery};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Accept RFC 3339 or bare `YYYY-MM-DD` date strings
fn parse_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::bad_request(format!("unparseable date '{raw}'")))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time
        .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .and_utc())
}

/// `POST /error-logs` — bearer-authenticated single report
pub async fn create(
    State(state): State<AppState>,
    Json(report): Json<ErrorReport>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let id = state.ingestion.report_one(report).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(json!({ "id": id }))),
    ))
}

/// `POST /error-logs/batch` — atomic batch of up to 500 reports
pub async fn create_batch(
    State(state): State<AppState>,
    Json(reports): Json<Vec<ErrorReport>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<BatchRowOutcome>>>), ApiError> {
    let outcomes = state.ingestion.report_batch(reports).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcomes))))
}

/// Listing query parameters, matching the wire names
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    project_id: String,
    #[serde(rename = "type")]
    error_type: Option<ErrorType>,
    level: Option<u8>,
    keyword: Option<String>,
    source_file: Option<String>,
    page_url: Option<String>,
    user_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
    sort_field: Option<String>,
    sort_order: Option<SortOrder>,
}

/// `GET /error-logs` — paged listing
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Page<ErrorLog>>>, ApiError> {
    let filter = ErrorLogFilter {
        project_id: params.project_id,
        error_type: params.error_type,
        error_level: params.level,
        keyword: params.keyword,
        source_file: params.source_file,
        page_url: params.page_url,
        user_id: params.user_id,
        start_date: params
            .start_date
            .as_deref()
            .map(|raw| parse_date(raw, false))
            .transpose()?,
        end_date: params
            .end_date
            .as_deref()
            .map(|raw| parse_date(raw, true))
            .transpose()?,
        page: params.page,
        limit: params.limit,
        sort_field: params.sort_field,
        sort_order: params.sort_order,
    };
    let page = state.error_logs.query(&filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    project_id: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

/// `GET /error-logs/stats/summary` — totals + byLevel + byType
pub async fn stats_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<ApiResponse<LogSummary>>, ApiError> {
    let start = params
        .start_date
        .as_deref()
        .map(|raw| parse_date(raw, false))
        .transpose()?;
    let end = params
        .end_date
        .as_deref()
        .map(|raw| parse_date(raw, true))
        .transpose()?;
    let summary = state.log_store.summary(&params.project_id, start, end).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendParams {
    project_id: String,
    days: Option<u32>,
    #[serde(rename = "type")]
    error_type: Option<ErrorType>,
}

/// `GET /error-logs/stats/trend` — daily series over the window
pub async fn stats_trend(
    State(state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<ApiResponse<Vec<TrendPoint>>>, ApiError> {
    let days = params.days.unwrap_or(7).clamp(1, 365);
    let series = state
        .log_store
        .trend(
            &params.project_id,
            &TrendQuery {
                time_range_hours: days * 24,
                granularity: Granularity::Day,
                error_type: params.error_type,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(series)))
}
