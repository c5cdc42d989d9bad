//! Logging Alert Mailer
//!
//! Email delivery is an external collaborator. This default adapter
//! records the alert as a structured log record and succeeds, keeping the
//! `email-notification` queue exercised end to end without an SMTP
//! dependency.

use async_trait::async_trait;
use tracing::warn;

use beacon_domain::error::Result;
use beacon_domain::ports::{AlertEmail, AlertMailer};

/// Structured-log [`AlertMailer`]
#[derive(Default)]
pub struct LogAlertMailer;

impl LogAlertMailer {
    /// Create the mailer
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertMailer for LogAlertMailer {
    async fn send_alert(&self, alert: &AlertEmail) -> Result<()> {
        warn!(
            project_id = %alert.project_id,
            error_hash = %alert.error_hash,
            occurrences = alert.occurrence_count,
            threshold = alert.threshold,
            message = %alert.error_message,
            "alert threshold crossed"
        );
        Ok(())
    }
}
