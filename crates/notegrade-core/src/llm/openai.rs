//! OpenAI-compatible chat-completions transport.
//!
//! This is the only place that interprets provider HTTP status codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatRequest, LlmClient};
use crate::error::{ConfigError, LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Error bodies are truncated to this many characters in messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub connect_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl OpenAiConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `NOTEGRADE_LLM_BASE_URL` | Chat-completions base URL |
    /// | `NOTEGRADE_LLM_API_KEY` | Bearer token (required) |
    /// | `NOTEGRADE_LLM_MODEL` | Default model |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("NOTEGRADE_LLM_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::invalid("NOTEGRADE_LLM_API_KEY is not set"))?;
        let defaults = Self::default();
        Ok(Self {
            base_url: lookup("NOTEGRADE_LLM_BASE_URL").unwrap_or(defaults.base_url),
            api_key,
            model: lookup("NOTEGRADE_LLM_MODEL").unwrap_or(defaults.model),
            ..defaults
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    endpoint: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::invalid("LLM API key is empty"));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("notegrade/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid(format!("failed to build HTTP client: {}", e)))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            config,
            endpoint,
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> LlmResult<String> {
        let model = request
            .model_override
            .as_deref()
            .unwrap_or(&self.config.model);
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": self.config.temperature,
            "max_tokens": request.max_tokens,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        debug!(status, model, "chat completion response");

        if (200..300).contains(&status) {
            let envelope: Value = response.json().await?;
            return envelope
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| LlmError::schema_invalid("response has no choices[0].message.content"));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();
        Err(map_status(status, &text, retry_after))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn map_status(status: u16, body: &str, retry_after: Option<Duration>) -> LlmError {
    let message = error_message(body);
    match status {
        401 | 403 => LlmError::Auth { message },
        413 => LlmError::PayloadTooLarge { message },
        400 if body.contains("context_length_exceeded") => LlmError::PayloadTooLarge { message },
        429 => LlmError::Transient {
            message: format!("rate limited: {}", message),
            retry_after,
        },
        408 | 500..=599 => LlmError::Transient {
            message: format!("HTTP {}: {}", status, message),
            retry_after,
        },
        _ => LlmError::Rejected { status, message },
    }
}

/// `error.message` from an OpenAI error envelope, else the truncated body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn config_requires_api_key() {
        let err = OpenAiConfig::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("NOTEGRADE_LLM_API_KEY"));

        let vars: HashMap<&str, &str> = [
            ("NOTEGRADE_LLM_API_KEY", "sk-test"),
            ("NOTEGRADE_LLM_MODEL", "judge-large"),
        ]
        .into_iter()
        .collect();
        let cfg = OpenAiConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.model, "judge-large");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.temperature, 0.0);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(map_status(401, "", None), LlmError::Auth { .. }));
        assert!(matches!(map_status(403, "", None), LlmError::Auth { .. }));
        assert!(matches!(
            map_status(413, "", None),
            LlmError::PayloadTooLarge { .. }
        ));
        assert!(matches!(
            map_status(
                400,
                r#"{"error":{"code":"context_length_exceeded","message":"too long"}}"#,
                None
            ),
            LlmError::PayloadTooLarge { ref message } if message == "too long"
        ));
        assert!(map_status(429, "", Some(Duration::from_secs(2))).is_retryable());
        assert!(map_status(503, "", None).is_retryable());
        assert!(matches!(
            map_status(422, "nope", None),
            LlmError::Rejected { status: 422, .. }
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(OpenAiClient::new(OpenAiConfig::default()).is_err());
        let client = OpenAiClient::new(
            OpenAiConfig::default()
                .with_api_key("k")
                .with_base_url("http://localhost:1/v1/"),
        )
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:1/v1/chat/completions");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::remove_var("NOTEGRADE_LLM_BASE_URL");
        std::env::remove_var("NOTEGRADE_LLM_MODEL");

        std::env::set_var("NOTEGRADE_LLM_API_KEY", "env-key");
        let cfg = OpenAiConfig::from_env();
        std::env::remove_var("NOTEGRADE_LLM_API_KEY");

        let cfg = cfg.unwrap();
        assert_eq!(cfg.api_key, "env-key");
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }

    #[test]
    #[serial]
    fn test_from_env_blank_key() {
        std::env::set_var("NOTEGRADE_LLM_API_KEY", "  ");
        let cfg = OpenAiConfig::from_env();
        std::env::remove_var("NOTEGRADE_LLM_API_KEY");

        assert!(matches!(cfg, Err(ConfigError::Invalid { .. })));
    }
}
