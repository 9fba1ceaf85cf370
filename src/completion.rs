//! Completion backends.
//!
//! A [`Completer`] sends one prompt to a generative text model and returns
//! the generated text. Every failure (transport, quota, bad status,
//! unexpected payload) surfaces as a [`CompletionError`]; callers treat it
//! as one opaque kind. Backends never retry.
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `gemini` | `POST {base}/v1beta/models/{model}:generateContent` |
//! | `openai` | `POST {base}/v1/chat/completions` |
//! | `disabled` | always fails |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::CompletionConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider is disabled")]
    Disabled,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Sends `prompt` and returns the generated text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Builds the backend named by `config.provider`.
///
/// Fails if an enabled provider has no API key in its environment variable.
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompleter)),
        "gemini" => Ok(Arc::new(GeminiCompleter::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompleter::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

fn read_api_key(config: &CompletionConfig) -> Result<String> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", config.api_key_env),
    }
}

fn http_client(config: &CompletionConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Sends a JSON body and returns the parsed JSON response, mapping
/// non-success statuses to [`CompletionError::Status`].
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, CompletionError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body: truncate(&body_text, 500),
        });
    }

    Ok(response.json().await?)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============ Disabled ============

/// Backend used when `completion.provider = "disabled"`.
pub struct DisabledCompleter;

#[async_trait]
impl Completer for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

// ============ Gemini ============

/// Google Gemini `generateContent` backend.
pub struct GeminiCompleter {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiCompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            api_key: read_api_key(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Completer for GeminiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "gemini request");
        let request = self.client.post(&url).header("x-goog-api-key", &self.api_key);
        let json = post_json(request, &body).await?;
        parse_gemini_response(&json)
    }
}

/// Joins the text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String, CompletionError> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| CompletionError::Malformed("missing candidates/content/parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(CompletionError::Malformed("empty completion".into()));
    }
    Ok(text)
}

// ============ OpenAI-compatible ============

/// OpenAI-compatible `chat/completions` backend.
///
/// The whole prompt goes out as a single user message.
pub struct OpenAICompleter {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAICompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            api_key: read_api_key(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Completer for OpenAICompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "openai request");
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let json = post_json(request, &body).await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &Value) -> Result<String, CompletionError> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| CompletionError::Malformed("missing choices/message/content".into()))?;

    if text.trim().is_empty() {
        return Err(CompletionError::Malformed("empty completion".into()));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_parts_are_joined() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "We are open " }, { "text": "9-5." }] }
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "We are open 9-5.");
    }

    #[test]
    fn gemini_without_candidates_is_malformed() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[test]
    fn openai_content_is_extracted() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" } }]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), "Hello!");
        assert!(parse_openai_response(&json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        let completer = create_completer(&CompletionConfig {
            provider: "disabled".to_string(),
            ..CompletionConfig::default()
        })
        .unwrap();
        assert_eq!(completer.model_name(), "disabled");
        let err = completer.complete("hi").await.unwrap_err();
        assert_eq!(err.to_string(), "completion provider is disabled");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = CompletionConfig {
            api_key_env: "DESKBOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..CompletionConfig::default()
        };
        let err = create_completer(&config).err().unwrap();
        assert!(err.to_string().contains("DESKBOT_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
