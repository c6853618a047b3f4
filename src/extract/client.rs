//! Reasoning service client.
//!
//! The passes talk to the reasoning service through [`ReasoningService`], so
//! the coordinator can run against a scripted implementation in tests. The
//! production implementation is an HTTP client speaking a messages-style
//! JSON protocol.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

use crate::config::ChronicleConfig;

/// Abstraction over the model endpoint a pass sends its prompt to.
///
/// Implementations return the raw response text; parsing and validation stay
/// on our side of the seam.
pub trait ReasoningService {
    fn complete(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// HTTP client for a hosted messages API.
#[derive(Debug, Clone)]
pub struct HttpReasoningClient {
    http: reqwest::Client,
    service_url: String,
    api_key: String,
}

impl HttpReasoningClient {
    /// Build a client from config. Fails if the API key env var is unset.
    pub fn from_config(config: &ChronicleConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.extraction.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            service_url: config.extraction.service_url.clone(),
            api_key,
        })
    }
}

impl ReasoningService for HttpReasoningClient {
    async fn complete(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(&self.service_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("reasoning service request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("reasoning service returned {status}: {detail}"));
        }

        let payload: Value = response
            .json()
            .await
            .context("reasoning service returned non-JSON body")?;

        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("reasoning service response missing content text"))
    }
}
