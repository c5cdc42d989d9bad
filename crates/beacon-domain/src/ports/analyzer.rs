//! External AI Analyzer Port
//!
//! Single seam to the model provider: one prompt in, one raw completion
//! out. The orchestrator owns prompt assembly and response parsing; the
//! adapter owns transport, credentials, and provider quirks.

use async_trait::async_trait;

use crate::error::Result;

/// External error analyzer
#[async_trait]
pub trait ErrorAnalyzer: Send + Sync {
    /// Submit the unified prompt and return the raw completion text.
    /// Called exactly once per diagnosis attempt.
    async fn analyze(&self, prompt: &str) -> Result<String>;

    /// Whether diagnosis is enabled at all (config kill switch)
    fn is_enabled(&self) -> bool;
}
