//! Language model adapter for structured field extraction.
//!
//! Defines the [`Analyzer`] trait and two concrete implementations:
//! - **[`OpenAiAnalyzer`]** — calls the OpenAI chat completions API.
//! - **[`OllamaAnalyzer`]** — calls a local Ollama instance's `/api/generate`.
//!
//! Both return the model's raw text output; locating and parsing the JSON
//! object inside it is the pipeline's job (see [`crate::scan`]).
//!
//! # Retry Strategy
//!
//! Transient errors use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retries cover only the HTTP call. A pipeline unit whose analysis
//! exhausts its retries fails terminally; there is no pipeline-level retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// A language model that turns document text into raw output expected to
/// contain one JSON object.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Sends `text` to the model and returns its raw text output.
    async fn analyze(&self, text: &str) -> Result<String>;
}

/// Creates the configured [`Analyzer`].
pub fn create_analyzer(config: &LlmConfig) -> Result<Arc<dyn Analyzer>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiAnalyzer::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaAnalyzer::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ OpenAI ============

/// Analyzer backed by `POST https://api.openai.com/v1/chat/completions`.
///
/// The extraction prompt goes in as the system message, the document text
/// as the user message. Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiAnalyzer {
    model: String,
    prompt: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiAnalyzer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            prompt: config.prompt.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, text: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.prompt},
                {"role": "user", "content": text},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Analysis failed after retries")))
    }
}

/// Extracts `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

// ============ Ollama ============

/// Analyzer backed by a local Ollama instance's `POST /api/generate`
/// endpoint (default URL `http://localhost:11434`). The prompt and
/// document text are concatenated into a single non-streaming request.
pub struct OllamaAnalyzer {
    model: String,
    prompt: String,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaAnalyzer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            prompt: config.prompt.clone(),
            url,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Analyzer for OllamaAnalyzer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, text: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", self.prompt, text),
            "stream": false,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/generate", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_generate_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama analysis failed after retries")))
    }
}

/// Extracts the `response` field from an Ollama generate response.
fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_chat_response_content() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn chat_response_without_choices_is_an_error() {
        assert!(parse_chat_response(&json!({"choices": []})).is_err());
        assert!(parse_chat_response(&json!({})).is_err());
    }

    #[test]
    fn parses_generate_response_field() {
        let json = json!({"model": "llama3", "response": "hello", "done": true});
        assert_eq!(parse_generate_response(&json).unwrap(), "hello");
    }

    #[test]
    fn generate_response_without_field_is_an_error() {
        assert!(parse_generate_response(&json!({"done": true})).is_err());
    }
}
