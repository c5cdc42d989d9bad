//! Sourcemap Resolution Worker
//!
//! Worker on the `sourcemap-processing` queue. Parses the stack of one
//! error log, resolves the first frame against the project's source maps,
//! and writes the original location back. An absent map means the job
//! succeeds without mutating anything; duplicate deliveries are tolerated
//! because the write-back is idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use beacon_domain::entities::ResolvedLocation;
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ActiveJob, ErrorLogRepository, JobHandler, SourceCodeRepository, SourcemapResolver,
};
use beacon_domain::stack::parse_stack;

/// Sourcemap write-back worker (§ resolution pipeline)
pub struct ResolveWorker {
    error_logs: Arc<dyn ErrorLogRepository>,
    resolver: Arc<dyn SourcemapResolver>,
    source_code: Arc<dyn SourceCodeRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolvePayload {
    error_id: i64,
}

impl ResolveWorker {
    /// Create the worker with injected handles
    pub fn new(
        error_logs: Arc<dyn ErrorLogRepository>,
        resolver: Arc<dyn SourcemapResolver>,
        source_code: Arc<dyn SourceCodeRepository>,
    ) -> Self {
        Self {
            error_logs,
            resolver,
            source_code,
        }
    }

    /// Resolve one log's top frame; returns whether a mutation happened
    ///
    /// # Errors
    ///
    /// Returns an error only for corrupt maps or store failures; a missing
    /// log, stack, or map is a successful no-op.
    pub async fn run(&self, error_id: i64) -> Result<bool> {
        let Some(log) = self.error_logs.find_by_id(error_id).await? else {
            debug!(error_id, "log vanished before resolution");
            return Ok(false);
        };
        if log.is_source_resolved {
            debug!(error_id, "already resolved");
            return Ok(false);
        }
        let Some(stack) = log.error_stack.as_deref() else {
            return Ok(false);
        };
        let frames = parse_stack(stack);
        let Some(first) = frames.first() else {
            return Ok(false);
        };

        let version = match &log.project_version {
            Some(v) => v.clone(),
            None => match self
                .source_code
                .find_active_version(&log.project_id)
                .await?
            {
                Some(v) => v.version,
                None => {
                    debug!(error_id, project_id = %log.project_id, "no version to resolve against");
                    return Ok(false);
                }
            },
        };

        let resolved = self
            .resolver
            .resolve_one(&log.project_id, &version, first)
            .await?;
        let Some(original) = resolved.original else {
            debug!(error_id, "no map covers the frame");
            return Ok(false);
        };

        let snippet = resolved
            .context
            .map(|ctx| ctx.lines.join("\n"))
            .filter(|s| !s.is_empty());
        let resolution = ResolvedLocation {
            original_source: original.source,
            original_line: original.line,
            original_column: original.column,
            function_name: original.name.or_else(|| first.function.clone()),
            source_snippet: snippet,
        };
        self.error_logs.apply_resolution(error_id, &resolution).await?;
        info!(
            error_id,
            source = %resolution.original_source,
            line = resolution.original_line,
            "frame resolved"
        );
        Ok(true)
    }
}

#[async_trait]
impl JobHandler for ResolveWorker {
    async fn handle(&self, job: &ActiveJob) -> Result<()> {
        let payload: ResolvePayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::bad_request(format!("malformed resolve payload: {e}")))?;
        self.run(payload.error_id).await?;
        Ok(())
    }
}
