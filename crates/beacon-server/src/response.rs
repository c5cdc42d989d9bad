//! Response Envelope
//!
//! Every endpoint answers `{success, message, data?}`; errors use the same
//! shape with `success: false` and no stack traces.

use serde::Serialize;

/// Uniform success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true` on this type
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Endpoint payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Success with payload
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "ok".to_owned(),
            data: Some(data),
        }
    }

    /// Success with payload and a specific message
    pub fn with_message<S: Into<String>>(message: S, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Success without payload
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
