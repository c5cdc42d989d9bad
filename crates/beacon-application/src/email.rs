//! Alert Email Worker
//!
//! Worker on the `email-notification` queue. Delivery itself sits behind
//! the [`AlertMailer`] port; this worker only decodes the payload and hands
//! it over, so retry policy stays with the fabric.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{ActiveJob, AlertEmail, AlertMailer, JobHandler};

/// Alert delivery worker
pub struct EmailWorker {
    mailer: Arc<dyn AlertMailer>,
}

impl EmailWorker {
    /// Create the worker with the injected mailer
    pub fn new(mailer: Arc<dyn AlertMailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl JobHandler for EmailWorker {
    async fn handle(&self, job: &ActiveJob) -> Result<()> {
        let alert: AlertEmail = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::bad_request(format!("malformed alert payload: {e}")))?;
        self.mailer.send_alert(&alert).await?;
        info!(
            project_id = %alert.project_id,
            error_hash = %alert.error_hash,
            occurrences = alert.occurrence_count,
            "alert delivered"
        );
        Ok(())
    }
}
