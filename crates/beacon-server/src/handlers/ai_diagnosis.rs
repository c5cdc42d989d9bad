//! AI diagnosis endpoints: trigger analysis, read back reports.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use beacon_domain::Error;
use beacon_domain::ports::{JobOptions, QueueName};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeBody {
    force: bool,
}

/// `POST /ai-diagnosis/error/{id}/analyze` — queue analysis for the log's
/// aggregation
pub async fn analyze_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
    body: Option<Json<AnalyzeBody>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .error_logs
        .find_by_id(error_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("error log {error_id}")))?;
    let force = body.map(|Json(b)| b.force).unwrap_or_default();
    let job_id = state
        .queues
        .add(
            QueueName::AiDiagnosis,
            "analyze-error",
            json!({ "errorId": error_id, "force": force }),
            JobOptions::default(),
        )
        .await?;
    Ok(Json(ApiResponse::with_message(
        "diagnosis queued",
        json!({ "jobId": job_id }),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveBody {
    aggregation_id: i64,
    #[serde(default)]
    force: bool,
}

/// `POST /ai-diagnosis/comprehensive-analysis` — queue analysis for one
/// aggregation
pub async fn comprehensive(
    State(state): State<AppState>,
    Json(body): Json<ComprehensiveBody>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .aggregations
        .find_by_id(body.aggregation_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("aggregation {}", body.aggregation_id)))?;
    let job_id = state
        .queues
        .add(
            QueueName::AiDiagnosis,
            "analyze-error",
            json!({ "aggregationId": body.aggregation_id, "force": body.force }),
            JobOptions::default(),
        )
        .await?;
    Ok(Json(ApiResponse::with_message(
        "comprehensive analysis queued",
        json!({ "jobId": job_id }),
    )))
}

/// `GET /ai-diagnosis/aggregation/{id}/report` — stored report + history
pub async fn report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let aggregation = state
        .aggregations
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("aggregation {id}")))?;
    Ok(Json(ApiResponse::ok(json!({
        "aiDiagnosis": aggregation.ai_diagnosis,
        "aiFixSuggestion": aggregation.ai_fix_suggestion,
        "aiDiagnosisHistory": aggregation.ai_diagnosis_history,
        "comprehensiveAnalysisReport": aggregation.comprehensive_analysis_report,
    }))))
}
