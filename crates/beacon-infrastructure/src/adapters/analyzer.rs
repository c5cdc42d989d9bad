//! HTTP Error Analyzer
//!
//! Thin adapter over whatever completion endpoint is configured. One POST
//! per diagnosis attempt; the response is picked apart tolerantly because
//! providers disagree about where the completion text lives.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::ErrorAnalyzer;

use crate::config::AiConfig;

/// reqwest-backed [`ErrorAnalyzer`]
pub struct HttpErrorAnalyzer {
    client: reqwest::Client,
    config: AiConfig,
}

impl HttpErrorAnalyzer {
    /// Build the analyzer from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be built.
    pub fn new(config: AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("analyzer client build failed: {e}")))?;
        Ok(Self { client, config })
    }
}

/// Completion text wherever the provider put it
fn extract_completion(body: &Value) -> Option<String> {
    for key in ["text", "content", "response", "output"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            return Some(text.to_owned());
        }
    }
    body.pointer("/choices/0/message/content")
        .or_else(|| body.pointer("/choices/0/text"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[async_trait]
impl ErrorAnalyzer for HttpErrorAnalyzer {
    async fn analyze(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "prompt": prompt,
            }))
            .send()
            .await
            .map_err(|e| Error::analyzer_with_source("analyzer request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::analyzer(format!(
                "analyzer returned HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::analyzer_with_source("analyzer response unreadable", e))?;
        let completion = extract_completion(&body)
            .ok_or_else(|| Error::analyzer("analyzer response carried no completion text"))?;
        debug!(chars = completion.len(), "analyzer completion received");
        Ok(completion)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_handles_common_shapes() {
        let flat = serde_json::json!({"text": "done"});
        assert_eq!(extract_completion(&flat).as_deref(), Some("done"));

        let openai = serde_json::json!({"choices": [{"message": {"content": "nested"}}]});
        assert_eq!(extract_completion(&openai).as_deref(), Some("nested"));

        let legacy = serde_json::json!({"choices": [{"text": "older"}]});
        assert_eq!(extract_completion(&legacy).as_deref(), Some("older"));

        let empty = serde_json::json!({"usage": {}});
        assert_eq!(extract_completion(&empty), None);
    }
}
