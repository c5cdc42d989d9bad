//! Aggregation triage endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;

use beacon_domain::Error;
use beacon_domain::entities::{
    AggregationStatus, AggregationUpdate, ErrorAggregation, ErrorType, Page,
};
use beacon_domain::ports::{AggregationFilter, JobOptions, QueueName};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    project_id: Option<String>,
    status: Option<i8>,
    #[serde(rename = "type")]
    error_type: Option<ErrorType>,
    keyword: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// `GET /error-aggregations` — paged listing
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Page<ErrorAggregation>>>, ApiError> {
    let page = state
        .aggregations
        .query(&AggregationFilter {
            project_id: params.project_id,
            status: params.status,
            error_type: params.error_type,
            keyword: params.keyword,
            page: params.page,
            limit: params.limit,
        })
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// `GET /error-aggregations/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ErrorAggregation>>, ApiError> {
    let aggregation = state
        .aggregations
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
    Ok(Json(ApiResponse::ok(aggregation)))
}

/// Operator-editable body for the update endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    status: Option<i8>,
    error_level: Option<u8>,
    notes: Option<String>,
    assigned_to: Option<String>,
    tags: Option<Vec<String>>,
}

/// `PUT /error-aggregations/{id}` — the only path that moves status.
///
/// Transitions outside the DAG (`resolved → ignored` and the like) are
/// conflicts, not silent overwrites.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<ApiResponse<ErrorAggregation>>, ApiError> {
    let status = body
        .status
        .map(|raw| {
            AggregationStatus::from_i8(raw)
                .ok_or_else(|| Error::bad_request(format!("unknown status {raw}")))
        })
        .transpose()?;
    if let Some(level) = body.error_level {
        if !(1..=4).contains(&level) {
            return Err(Error::bad_request("errorLevel must be between 1 and 4").into());
        }
    }

    if let Some(target) = status {
        let current = state
            .aggregations
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
        if !current.status.can_transition(target) {
            return Err(Error::conflict(format!(
                "status transition {:?} -> {target:?} is not allowed",
                current.status
            ))
            .into());
        }
    }

    let updated = state
        .aggregations
        .update(
            id,
            &AggregationUpdate {
                status,
                error_level: body.error_level,
                notes: body.notes,
                assigned_to: body.assigned_to,
                tags: body.tags,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// `DELETE /error-aggregations/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .aggregations
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
    state.aggregations.delete(id).await?;
    Ok(Json(ApiResponse::message("aggregation deleted")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    project_id: String,
}

/// `POST /error-aggregations/trigger-aggregation` — enqueue a manual run
pub async fn trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let job_id = state
        .queues
        .add(
            QueueName::ErrorAggregation,
            "aggregate-project",
            json!({ "projectId": params.project_id }),
            JobOptions::default(),
        )
        .await?;
    Ok(Json(ApiResponse::with_message(
        "aggregation queued",
        json!({ "jobId": job_id }),
    )))
}

/// `POST /error-aggregations/{id}/reanalyze` — force a fresh diagnosis
pub async fn reanalyze(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .aggregations
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
    let job_id = state
        .queues
        .add(
            QueueName::AiDiagnosis,
            "analyze-error",
            json!({ "aggregationId": id, "force": true }),
            JobOptions::default(),
        )
        .await?;
    Ok(Json(ApiResponse::with_message(
        "reanalysis queued",
        json!({ "jobId": job_id }),
    )))
}
