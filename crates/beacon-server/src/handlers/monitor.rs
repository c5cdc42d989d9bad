//! SDK intake endpoint (`/monitor/report`).

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde_json::json;

use beacon_application::ErrorReport;
use beacon_domain::Error;

use crate::auth::project_from_api_key;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// `POST /monitor/report` — api-key authenticated single report.
///
/// The key pins the project: an empty body `projectId` inherits it, a
/// mismatched one is refused.
pub async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut report): Json<ErrorReport>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let project = project_from_api_key(&state, &headers).await?;
    if report.project_id.is_empty() {
        report.project_id = project.project_id.clone();
    } else if report.project_id != project.project_id {
        return Err(Error::forbidden("projectId does not match the api key").into());
    }

    match state.ingestion.report_one(report).await? {
        Some(id) => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::with_message("report accepted", json!({ "id": id }))),
        )),
        None => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::with_message(
                "report sampled out",
                json!({ "id": null }),
            )),
        )),
    }
}
