//! HTTP Error Mapping
//!
//! Maps the domain taxonomy onto status codes and the error envelope.
//! Store-unavailable conditions surface as 503 on health-ish routes but
//! are logged and returned as 500 from ingestion, matching the rule that
//! a disconnected store is never client-visible success.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use beacon_domain::Error;

/// Domain error carried across a handler boundary
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(Error::from(err))
    }
}

/// Taxonomy tag attached to the envelope
fn tag(err: &Error) -> &'static str {
    match err {
        Error::BadRequest { .. }
        | Error::Config { .. }
        | Error::ConfigMissing(_)
        | Error::Json { .. } => "BadRequest",
        Error::NotFound { .. } | Error::SourceMapMissing { .. } => "NotFound",
        Error::Conflict { .. } => "Conflict",
        Error::Unauthorized { .. } => "Unauthorized",
        Error::Forbidden { .. } => "Forbidden",
        Error::Timeout { .. } => "Timeout",
        Error::Unavailable { .. } => "Unavailable",
        _ => "Internal",
    }
}

fn status(err: &Error) -> StatusCode {
    match err {
        Error::BadRequest { .. }
        | Error::Config { .. }
        | Error::ConfigMissing(_)
        | Error::Json { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } | Error::SourceMapMissing { .. } => StatusCode::NOT_FOUND,
        Error::Conflict { .. } => StatusCode::CONFLICT,
        Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        Error::Forbidden { .. } => StatusCode::FORBIDDEN,
        Error::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
        Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }
        // message only; internals never cross the boundary
        let body = json!({
            "success": false,
            "message": self.0.to_string(),
            "error": tag(&self.0),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(status(&Error::bad_request("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status(&Error::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status(&Error::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(status(&Error::unauthorized("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(&Error::forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(status(&Error::timeout("x")), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status(&Error::unavailable("x")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(&Error::internal("x")), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(&Error::database("x")), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
