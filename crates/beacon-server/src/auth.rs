//! Authentication
//!
//! Management routes carry `Authorization: Bearer <token>` checked against
//! the configured token; `/monitor/report` instead authenticates with the
//! project api key (`x-api-key` header), which also pins the report to the
//! key's project.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use beacon_domain::Error;
use beacon_domain::entities::Project;

use crate::error::ApiError;
use crate::state::AppState;

/// Bearer-token gate for the management surface. A deployment without a
/// configured token runs open (development mode).
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.auth_token {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(token) if token == expected.as_ref() => {}
            Some(_) => return Err(Error::forbidden("bearer token rejected").into()),
            None => return Err(Error::unauthorized("bearer token required").into()),
        }
    }
    Ok(next.run(request).await)
}

/// Resolve the reporting project from the `x-api-key` header
pub async fn project_from_api_key(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<Project, ApiError> {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::unauthorized("x-api-key header required"))?;
    state
        .projects
        .find_by_api_key(key)
        .await?
        .ok_or_else(|| Error::unauthorized("api key rejected").into())
}
