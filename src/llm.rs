//! Language model provider abstraction and implementations.
//!
//! Defines the [`LanguageModel`] trait and concrete implementations:
//! - **[`GeminiModel`]**: Google `generateContent` API with a system instruction.
//! - **[`OpenAIModel`]**: OpenAI-compatible chat completions.
//!
//! # Provider Selection
//!
//! Use [`create_model`] to instantiate the configured provider. A
//! `"disabled"` provider yields `None`, and callers report that no model is
//! configured instead of failing:
//!
//! ```rust
//! # use repo_lens::config::LlmConfig;
//! # use repo_lens::llm::create_model;
//! let config = LlmConfig {
//!     provider: "disabled".to_string(),
//!     ..LlmConfig::default()
//! };
//! assert!(create_model(&config).unwrap().is_none());
//! ```
//!
//! # Retry Strategy
//!
//! Both providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A chat model that turns a (system, user) prompt pair into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn name(&self) -> &str;

    /// Runs one completion. Transient failures are retried internally.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Create the configured [`LanguageModel`].
///
/// | Config Value | Provider | Key variable |
/// |-------------|----------|--------------|
/// | `"disabled"` | none | |
/// | `"gemini"` | [`GeminiModel`] | `GOOGLE_API_KEY` |
/// | `"openai"` | [`OpenAIModel`] | `OPENAI_API_KEY` |
///
/// # Errors
///
/// Returns an error for unknown provider names or a missing API key.
pub fn create_model(config: &LlmConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    let model: Arc<dyn LanguageModel> = match config.provider.as_str() {
        "disabled" => return Ok(None),
        "gemini" => Arc::new(GeminiModel::new(config)?),
        "openai" => Arc::new(OpenAIModel::new(config)?),
        other => bail!("Unknown llm provider: {}", other),
    };
    Ok(Some(model))
}

fn api_key(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable not set", var))
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// POST `body` to `url`, retrying 429/5xx and network errors.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, ?delay, "{} retry", label);
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await.map_err(|e| e.without_url())?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.without_url().into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

// ============ Gemini ============

/// Google Gemini via `POST {base}/models/{model}:generateContent`.
pub struct GeminiModel {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiModel {
    /// Reads the key from `GOOGLE_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_key(config, api_key("GOOGLE_API_KEY")?)
    }

    pub fn with_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        let json = post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", self.api_key.clone())],
            &body,
            self.max_retries,
            "Gemini",
        ).await?;
        parse_gemini_response(&json)
    }
}

/// Concatenates the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text.trim().to_string())
}

// ============ OpenAI ============

/// OpenAI-compatible `POST {base}/chat/completions`.
pub struct OpenAIModel {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIModel {
    /// Reads the key from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_key(config, api_key("OPENAI_API_KEY")?)
    }

    pub fn with_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let json = post_json(
            &self.client,
            &url,
            &headers,
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gemini_response() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "world\n" }] }
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Hello world");
        assert!(parse_gemini_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": " answer " } }]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), "answer");
        assert!(parse_openai_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_create_model_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_model(&config).is_err());
    }
}
