//! OpenAI-compatible oracle client.

use super::prompt::render_prompt;
use super::{ExtractionOracle, OracleRequest, OracleResponse, Usage};
use crate::config::OracleConfig;
use crate::error::{PrefillError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Talks to any `/chat/completions` endpoint that speaks the OpenAI wire
/// format. The model is instructed to answer with a single JSON object whose
/// keys are exactly the requested field names.
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiOracle {
    /// Create a client from config; the API key is read from the
    /// environment variable the config names.
    pub fn new(config: OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PrefillError::oracle(format!(
                "API key environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PrefillError::oracle_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn extract(&self, request: OracleRequest) -> Result<OracleResponse> {
        let prompt = render_prompt(&request)?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
        });

        tracing::debug!(label = %request.label, fields = request.fields.len(), "calling extraction oracle");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PrefillError::oracle_with_source("Oracle request failed", e))?;

        let response = response
            .error_for_status()
            .map_err(|e| PrefillError::oracle_with_source("Oracle returned an error status", e))?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PrefillError::oracle_with_source("Failed to decode oracle response", e))?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| PrefillError::oracle("Oracle response contained no choices"))?;

        let raw: HashMap<String, Option<String>> = serde_json::from_str(content).map_err(|e| {
            PrefillError::oracle_with_source("Oracle did not return the requested JSON object", e)
        })?;

        // Answer exactly the requested keys; anything the model omitted is
        // null, anything it invented is dropped.
        let values = request
            .fields
            .keys()
            .map(|key| (key.clone(), raw.get(key).cloned().flatten()))
            .collect();

        let usage = completion
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(OracleResponse { values, usage })
    }
}
