//! Error-location endpoints: frame resolution and source lookup.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use beacon_domain::Error;
use beacon_domain::ports::{LocatedSource, ResolvedFrame};
use beacon_domain::stack::{StackFrame, parse_stack};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Resolve request: explicit frames, raw stack text, or both
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBody {
    project_id: String,
    version: Option<String>,
    #[serde(default)]
    frames: Vec<StackFrame>,
    error_stack: Option<String>,
}

/// `POST /error-location/resolve` — batch frame resolution
pub async fn resolve(
    State(state): State<AppState>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ApiResponse<Vec<ResolvedFrame>>>, ApiError> {
    let mut frames = body.frames;
    if let Some(stack) = body.error_stack.as_deref() {
        frames.extend(parse_stack(stack));
    }
    if frames.is_empty() {
        return Err(Error::bad_request("no frames to resolve").into());
    }

    let version = match body.version {
        Some(v) => v,
        None => state
            .source_code
            .find_active_version(&body.project_id)
            .await?
            .map(|v| v.version)
            .ok_or_else(|| Error::not_found("active version"))?,
    };
    let resolved = state
        .resolver
        .resolve(&body.project_id, &version, &frames)
        .await?;
    Ok(Json(ApiResponse::ok(resolved)))
}

/// `GET /error-location/error/{errorId}/source-code` — snippet for one log
pub async fn error_source(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
) -> Result<Json<ApiResponse<LocatedSource>>, ApiError> {
    let log = state
        .error_logs
        .find_by_id(error_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("error log {error_id}")))?;

    // prefer the resolved original location, fall back to the minified one
    let (path, line) = match (&log.original_source, &log.source_file) {
        (Some(original), _) => (original.clone(), log.original_line),
        (None, Some(minified)) => (minified.clone(), log.source_line),
        (None, None) => {
            return Err(Error::not_found(format!(
                "error log {error_id} carries no source location"
            ))
            .into());
        }
    };
    let located = state
        .archive
        .by_location(
            &log.project_id,
            log.project_version.as_deref(),
            &path,
            line,
            5,
        )
        .await?;
    Ok(Json(ApiResponse::ok(located)))
}

/// `POST /error-location/clear-cache` — drop every cached map consumer
pub async fn clear_cache(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let released = state.resolver.clear_cache().await;
    Ok(Json(ApiResponse::with_message(
        "resolver cache cleared",
        json!({ "released": released }),
    )))
}
