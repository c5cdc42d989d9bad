//! Alert Mailer Port
//!
//! Email delivery itself is an external collaborator; the pipeline only
//! needs a seam the `email-notification` worker can call. The default
//! adapter logs the alert and succeeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Alert payload for a threshold crossing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEmail {
    /// Owning project
    pub project_id: String,
    /// Fingerprint that crossed the threshold
    pub error_hash: String,
    /// Representative message
    pub error_message: String,
    /// Occurrence count at crossing time
    pub occurrence_count: u64,
    /// The configured threshold
    pub threshold: u64,
}

/// Alert email delivery seam
#[async_trait]
pub trait AlertMailer: Send + Sync {
    /// Deliver (or record) one alert
    async fn send_alert(&self, alert: &AlertEmail) -> Result<()>;
}
